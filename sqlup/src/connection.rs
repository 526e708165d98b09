//! Connection lifecycle and command execution.
//!
//! A [`ConnectionManager`] owns the only path to the database. Callers never hold a
//! connection: they ask for a managed scope with [`ConnectionManager::with_managed_connection`]
//! and create commands through the [`CommandFactory`] it hands them. The first scope opens a
//! connection, nested scopes reuse it, and it is closed when the outermost scope ends, whether
//! the closure returned `Ok`, returned `Err` or panicked.

use crate::dialect::Dialect;
use crate::error::Error;
use crate::log::UpgradeLog;
use std::cell::{Cell, RefCell};
use std::time::Duration;

/// Result rows of a query. Every value is rendered as text; SQL `NULL` is `None`.
pub type Rows = Vec<Vec<Option<String>>>;

/// An open connection to the target database. Dropping it closes it.
pub trait DbConnection {
    /// Execute a statement that returns no rows, returning the number of affected rows when
    /// the driver reports it.
    fn execute_non_query(&mut self, sql: &str, timeout: Option<Duration>) -> Result<u64, Error>;

    /// Execute a query and return the first column of the first row.
    fn execute_scalar(&mut self, sql: &str, timeout: Option<Duration>) -> Result<Option<String>, Error>;

    /// Execute a query and return all rows.
    fn execute_reader(&mut self, sql: &str, timeout: Option<Duration>) -> Result<Rows, Error>;
}

/// Milliseconds for a server-side timeout setting where `0` disables the limit.
///
/// Sub-millisecond timeouts round up to 1 so they never read as "no limit".
#[cfg(any(feature = "postgres", feature = "mysql"))]
pub(crate) fn timeout_millis(timeout: Option<Duration>) -> u64 {
    timeout.map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1))
}

/// Opens connections to one target database.
pub trait ConnectionFactory {
    fn open(&self) -> Result<Box<dyn DbConnection>, Error>;
}

#[derive(Default)]
struct ScopeState {
    connection: Option<Box<dyn DbConnection>>,
    depth: usize,
}

/// Dialect-aware owner of the connection lifecycle.
pub struct ConnectionManager {
    dialect: Box<dyn Dialect>,
    factory: Box<dyn ConnectionFactory>,
    state: RefCell<ScopeState>,
    session_setup: Vec<String>,
    run_started: Cell<bool>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ConnectionManager")
            .field("dialect", &self.dialect)
            .field("session_setup", &self.session_setup)
            .field("open", &state.connection.is_some())
            .field("depth", &state.depth)
            .field("run_started", &self.run_started.get())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(dialect: impl Dialect + 'static, factory: impl ConnectionFactory + 'static) -> Self {
        Self::from_boxed(Box::new(dialect), Box::new(factory))
    }

    pub fn from_boxed(dialect: Box<dyn Dialect>, factory: Box<dyn ConnectionFactory>) -> Self {
        Self {
            dialect,
            factory,
            state: RefCell::new(ScopeState::default()),
            session_setup: Vec::new(),
            run_started: Cell::new(false),
        }
    }

    /// Statements to run on every new connection once a run has started, after the dialect's
    /// own session setup.
    pub fn with_session_setup<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.session_setup
            .extend(statements.into_iter().map(Into::into));
        self
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Split script text into statements using the dialect's rule.
    pub fn split_into_statements(&self, contents: &str) -> Vec<String> {
        self.dialect.split_into_statements(contents)
    }

    /// Called once before the first command of a run. From now on every connection opened
    /// runs the session setup statements first.
    pub fn on_run_start(&self, log: &dyn UpgradeLog) {
        let setup = self.session_statements();
        if !setup.is_empty() {
            log.write_information(&format!(
                "{} session setup statement(s) will run on each new connection",
                setup.len()
            ));
        }
        self.run_started.set(true);
    }

    /// Run `f` with a connection open for its whole duration.
    ///
    /// Reentrant: a call made while another scope is active reuses that scope's connection.
    pub fn with_managed_connection<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&CommandFactory<'_>) -> Result<T, Error>,
    {
        let _scope = self.enter()?;
        f(&CommandFactory { manager: self })
    }

    /// Whether a managed scope currently holds an open connection.
    pub fn is_open(&self) -> bool {
        self.state.borrow().connection.is_some()
    }

    fn enter(&self) -> Result<ScopeGuard<'_>, Error> {
        let mut state = self.state.borrow_mut();
        if state.depth == 0 {
            tracing::debug!(dialect = self.dialect.name(), "Opening connection");
            let mut connection = self.factory.open()?;
            if self.run_started.get() {
                for sql in self.session_statements() {
                    tracing::debug!(sql = %sql, "Applying session setup");
                    connection.execute_non_query(&sql, None)?;
                }
            }
            state.connection = Some(connection);
        }
        state.depth += 1;
        Ok(ScopeGuard { manager: self })
    }

    fn session_statements(&self) -> Vec<String> {
        let mut statements = self.dialect.session_setup_sql();
        statements.extend(self.session_setup.iter().cloned());
        statements
    }

    fn run<T>(
        &self,
        op: impl FnOnce(&mut dyn DbConnection) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut state = self.state.borrow_mut();
        match state.connection.as_mut() {
            Some(connection) => op(connection.as_mut()),
            None => Err(Error::Connection(
                "command used outside of a managed connection scope".to_string(),
            )),
        }
    }
}

struct ScopeGuard<'m> {
    manager: &'m ConnectionManager,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.manager.state.borrow_mut();
        state.depth -= 1;
        if state.depth == 0 {
            state.connection = None;
            tracing::debug!("Closed connection");
        }
    }
}

/// Creates commands bound to the connection of the current managed scope.
pub struct CommandFactory<'m> {
    manager: &'m ConnectionManager,
}

impl<'m> CommandFactory<'m> {
    pub fn create_command(&self, sql: impl Into<String>) -> DbCommand<'m> {
        DbCommand {
            manager: self.manager,
            text: sql.into(),
            timeout: None,
        }
    }
}

/// A single statement ready to execute.
pub struct DbCommand<'m> {
    manager: &'m ConnectionManager,
    text: String,
    timeout: Option<Duration>,
}

impl DbCommand<'_> {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn execute_non_query(self) -> Result<u64, Error> {
        self.manager
            .run(|c| c.execute_non_query(&self.text, self.timeout))
    }

    pub fn execute_scalar(self) -> Result<Option<String>, Error> {
        self.manager
            .run(|c| c.execute_scalar(&self.text, self.timeout))
    }

    pub fn execute_reader(self) -> Result<Rows, Error> {
        self.manager
            .run(|c| c.execute_reader(&self.text, self.timeout))
    }
}
