//! Testing utilities for script and engine development.
//!
//! [`MockConnectionFactory`] stands in for a real database: every command is recorded, and
//! individual statements can be made to fail or to return rows. [`RecordingLog`] keeps every
//! line written to the upgrade log.

use crate::connection::{ConnectionFactory, DbConnection, Rows};
use crate::error::Error;
use crate::log::UpgradeLog;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// How a command was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    NonQuery,
    Scalar,
    Reader,
}

/// A command seen by a mock connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommand {
    /// Sequence number of the connection the command ran on, starting at 1.
    pub connection: usize,
    pub text: String,
    pub kind: CommandKind,
    pub timeout: Option<Duration>,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct MockState {
    commands: Vec<RecordedCommand>,
    failures: Vec<(String, String)>,
    responses: Vec<(String, Rows)>,
    open_failure: Option<String>,
    opened: usize,
    closed: usize,
}

/// A [`ConnectionFactory`] whose connections record commands instead of running them.
///
/// Clones share state, so a test can keep one handle while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MockConnectionFactory {
    state: Rc<RefCell<MockState>>,
}

impl MockConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command whose text contains `fragment` with [`Error::Database`].
    pub fn fail_when(&self, fragment: impl Into<String>, message: impl Into<String>) {
        self.state
            .borrow_mut()
            .failures
            .push((fragment.into(), message.into()));
    }

    /// Remove every rule registered with [`MockConnectionFactory::fail_when`].
    pub fn clear_failures(&self) {
        self.state.borrow_mut().failures.clear();
    }

    /// Return `rows` for scalar and reader commands whose text contains `fragment`.
    pub fn respond_with(&self, fragment: impl Into<String>, rows: Rows) {
        self.state
            .borrow_mut()
            .responses
            .push((fragment.into(), rows));
    }

    /// Make opening a connection fail with [`Error::Connection`].
    pub fn fail_to_open(&self, message: impl Into<String>) {
        self.state.borrow_mut().open_failure = Some(message.into());
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.borrow().commands.clone()
    }

    /// Texts of all attempted non-query commands, in order.
    pub fn non_query_texts(&self) -> Vec<String> {
        self.texts(|c| c.kind == CommandKind::NonQuery)
    }

    /// Texts of non-query commands that succeeded, in order.
    pub fn successful_non_queries(&self) -> Vec<String> {
        self.texts(|c| c.kind == CommandKind::NonQuery && c.succeeded)
    }

    /// Texts of all reader commands, in order.
    pub fn reader_texts(&self) -> Vec<String> {
        self.texts(|c| c.kind == CommandKind::Reader)
    }

    pub fn connections_opened(&self) -> usize {
        self.state.borrow().opened
    }

    pub fn connections_closed(&self) -> usize {
        self.state.borrow().closed
    }

    fn texts(&self, filter: impl Fn(&RecordedCommand) -> bool) -> Vec<String> {
        self.state
            .borrow()
            .commands
            .iter()
            .filter(|c| filter(c))
            .map(|c| c.text.clone())
            .collect()
    }
}

impl ConnectionFactory for MockConnectionFactory {
    fn open(&self) -> Result<Box<dyn DbConnection>, Error> {
        let mut state = self.state.borrow_mut();
        if let Some(message) = &state.open_failure {
            return Err(Error::Connection(message.clone()));
        }
        state.opened += 1;
        Ok(Box::new(MockConnection {
            id: state.opened,
            state: Rc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    id: usize,
    state: Rc<RefCell<MockState>>,
}

impl MockConnection {
    fn run(&mut self, sql: &str, kind: CommandKind, timeout: Option<Duration>) -> Result<Rows, Error> {
        let mut state = self.state.borrow_mut();
        let failure = state
            .failures
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, message)| message.clone());
        state.commands.push(RecordedCommand {
            connection: self.id,
            text: sql.to_string(),
            kind,
            timeout,
            succeeded: failure.is_none(),
        });
        if let Some(message) = failure {
            return Err(Error::Database(message));
        }
        Ok(state
            .responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

impl DbConnection for MockConnection {
    fn execute_non_query(&mut self, sql: &str, timeout: Option<Duration>) -> Result<u64, Error> {
        self.run(sql, CommandKind::NonQuery, timeout).map(|_| 0)
    }

    fn execute_scalar(&mut self, sql: &str, timeout: Option<Duration>) -> Result<Option<String>, Error> {
        let rows = self.run(sql, CommandKind::Scalar, timeout)?;
        Ok(rows.into_iter().next().and_then(|row| row.into_iter().next().flatten()))
    }

    fn execute_reader(&mut self, sql: &str, timeout: Option<Duration>) -> Result<Rows, Error> {
        self.run(sql, CommandKind::Reader, timeout)
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.borrow_mut().closed += 1;
    }
}

/// A line written to a [`RecordingLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Information(String),
    Error(String),
}

/// An [`UpgradeLog`] that keeps every line in memory.
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: RefCell<Vec<LogEntry>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    pub fn information(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter_map(|e| match e {
                LogEntry::Information(m) => Some(m.clone()),
                LogEntry::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter_map(|e| match e {
                LogEntry::Error(m) => Some(m.clone()),
                LogEntry::Information(_) => None,
            })
            .collect()
    }
}

impl UpgradeLog for RecordingLog {
    fn write_information(&self, message: &str) {
        self.entries
            .borrow_mut()
            .push(LogEntry::Information(message.to_string()));
    }

    fn write_error(&self, message: &str) {
        self.entries
            .borrow_mut()
            .push(LogEntry::Error(message.to_string()));
    }
}
