//! The upgrade engine: filters scripts against the journal, runs the pending ones in name
//! order and records each success.

use crate::connection::{ConnectionFactory, ConnectionManager};
use crate::core::{ExecutedScript, ScriptFailure, SqlScript, UpgradeReport, Variables};
use crate::dialect::Dialect;
use crate::error::Error;
use crate::executor::ScriptExecutor;
use crate::journal::TableJournal;
use crate::log::{TracingLog, UpgradeLog};
use crate::preprocess::ScriptPreprocessor;
use serde::Deserialize;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// How scripts are wrapped in transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    /// Statements run in autocommit mode. The journal row is written after the script.
    #[default]
    NoTransaction,
    /// Each script and its journal row run inside one transaction, rolled back on failure.
    ///
    /// Engines that commit DDL implicitly (MySQL, Oracle) cannot roll back schema changes.
    TransactionPerScript,
}

type StartHook = Box<dyn Fn(&str) + Send + Sync>;
type CompleteHook = Box<dyn Fn(&str, Duration) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&str, &Error) + Send + Sync>;

/// Runs a set of scripts against one database.
///
/// Built from the dialect triple (connection manager, executor, journal) with
/// [`UpgradeEngine::new`], or from a dialect and connection factory with
/// [`UpgradeEngineBuilder`].
pub struct UpgradeEngine {
    connection_manager: Rc<ConnectionManager>,
    executor: ScriptExecutor,
    journal: TableJournal,
    log: Rc<dyn UpgradeLog>,
    variables: Variables,
    transaction_mode: TransactionMode,
    on_script_start: Option<StartHook>,
    on_script_complete: Option<CompleteHook>,
    on_script_error: Option<ErrorHook>,
}

// Manual Debug impl since closures don't implement Debug
impl std::fmt::Debug for UpgradeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeEngine")
            .field("executor", &self.executor)
            .field("journal", &self.journal)
            .field("variables", &self.variables)
            .field("transaction_mode", &self.transaction_mode)
            .field("on_script_start", &self.on_script_start.is_some())
            .field("on_script_complete", &self.on_script_complete.is_some())
            .field("on_script_error", &self.on_script_error.is_some())
            .finish()
    }
}

impl UpgradeEngine {
    /// Assemble an engine from its parts. `executor` and `journal` should share
    /// `connection_manager`.
    pub fn new(
        connection_manager: Rc<ConnectionManager>,
        executor: ScriptExecutor,
        journal: TableJournal,
        log: Rc<dyn UpgradeLog>,
    ) -> Self {
        Self {
            connection_manager,
            executor,
            journal,
            log,
            variables: Variables::new(),
            transaction_mode: TransactionMode::default(),
            on_script_start: None,
            on_script_complete: None,
            on_script_error: None,
        }
    }

    /// Variables available to every run. Variables passed to [`UpgradeEngine::run`] take
    /// precedence.
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    /// Set a callback to be invoked when a script starts.
    /// The callback receives the script name.
    pub fn on_script_start<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_script_start = Some(Box::new(callback));
        self
    }

    /// Set a callback to be invoked when a script has run and been journaled.
    /// The callback receives the script name and duration.
    pub fn on_script_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.on_script_complete = Some(Box::new(callback));
        self
    }

    /// Set a callback to be invoked when a script fails.
    /// The callback receives the script name and error.
    pub fn on_script_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &Error) + Send + Sync + 'static,
    {
        self.on_script_error = Some(Box::new(callback));
        self
    }

    pub fn executor(&self) -> &ScriptExecutor {
        &self.executor
    }

    pub fn journal(&self) -> &TableJournal {
        &self.journal
    }

    pub fn transaction_mode(&self) -> TransactionMode {
        self.transaction_mode
    }

    /// Names of the scripts recorded in the journal, ascending.
    pub fn executed_scripts(&self) -> Result<Vec<String>, Error> {
        self.journal.get_executed_scripts()
    }

    /// The journal with applied timestamps, ordered by script name.
    pub fn history(&self) -> Result<Vec<ExecutedScript>, Error> {
        self.journal.history()
    }

    /// Scripts that [`UpgradeEngine::run`] would execute, in the order it would execute them.
    pub fn scripts_to_execute<'s>(&self, scripts: &'s [SqlScript]) -> Result<Vec<&'s SqlScript>, Error> {
        check_unique(scripts)?;
        let executed = self.journal.get_executed_scripts()?;
        Ok(pending(scripts, &executed))
    }

    pub fn is_upgrade_required(&self, scripts: &[SqlScript]) -> Result<bool, Error> {
        Ok(!self.scripts_to_execute(scripts)?.is_empty())
    }

    /// Apply every script not yet in the journal, in ascending name order.
    ///
    /// Returns `Err` when the run cannot start (duplicate names, schema verification or
    /// journal failures). A failing script stops the run and is reported in
    /// [`UpgradeReport::failing_script`]; scripts before it stay journaled.
    pub fn run<'s>(
        &self,
        scripts: &'s [SqlScript],
        variables: Option<&Variables>,
    ) -> Result<UpgradeReport<'s>, Error> {
        check_unique(scripts)?;
        self.log.write_information("Beginning database upgrade");
        self.connection_manager.on_run_start(self.log.as_ref());
        self.executor.verify_schema()?;

        let journal_table_existed = self.journal.table_exists()?;
        let executed = self.journal.get_executed_scripts()?;
        let pending = pending(scripts, &executed);
        let variables = self.merged_variables(variables);

        tracing::debug!(
            executed = executed.len(),
            pending = ?pending.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Considering scripts to run"
        );

        if pending.is_empty() {
            self.log
                .write_information("No new scripts need to be executed - completing.");
            return Ok(UpgradeReport {
                journal_table_existed,
                scripts_run: Vec::new(),
                failing_script: None,
            });
        }

        if self.transaction_mode == TransactionMode::TransactionPerScript {
            // a failed probe inside an open transaction would abort it on some engines
            self.journal.ensure_table_exists()?;
        }

        let mut scripts_run = Vec::new();
        let mut failing_script = None;
        for script in pending {
            let _span = tracing::info_span!("script", name = %script.name()).entered();
            tracing::info!("Starting script");

            if let Some(ref callback) = self.on_script_start {
                callback(script.name());
            }
            let started = Instant::now();

            match self.apply(script, &variables) {
                Ok(()) => {
                    let duration = started.elapsed();
                    tracing::info!(
                        duration_ms = duration.as_millis(),
                        "Script completed successfully"
                    );
                    scripts_run.push(script.name().to_string());
                    if let Some(ref callback) = self.on_script_complete {
                        callback(script.name(), duration);
                    }
                }
                Err(error) => {
                    tracing::error!(error = %error, "Script failed");
                    if let Some(ref callback) = self.on_script_error {
                        callback(script.name(), &error);
                    }
                    self.log
                        .write_error(&format!("Upgrade failed due to an unexpected error: {}", error));
                    failing_script = Some(ScriptFailure { script, error });
                    break;
                }
            }
        }

        if failing_script.is_none() {
            self.log.write_information("Upgrade successful");
        }
        Ok(UpgradeReport {
            journal_table_existed,
            scripts_run,
            failing_script,
        })
    }

    /// Journal every pending script without running it.
    pub fn mark_as_executed<'s>(&self, scripts: &'s [SqlScript]) -> Result<UpgradeReport<'s>, Error> {
        check_unique(scripts)?;
        self.connection_manager.on_run_start(self.log.as_ref());
        let journal_table_existed = self.journal.table_exists()?;
        let executed = self.journal.get_executed_scripts()?;

        let mut scripts_run = Vec::new();
        let mut failing_script = None;
        for script in pending(scripts, &executed) {
            match self.journal.store_executed_script(script) {
                Ok(()) => {
                    self.log.write_information(&format!(
                        "Marking script {} as executed",
                        script.name()
                    ));
                    scripts_run.push(script.name().to_string());
                }
                Err(error) => {
                    self.log.write_error(&format!(
                        "Failed to mark script {} as executed: {}",
                        script.name(),
                        error
                    ));
                    failing_script = Some(ScriptFailure { script, error });
                    break;
                }
            }
        }
        Ok(UpgradeReport {
            journal_table_existed,
            scripts_run,
            failing_script,
        })
    }

    fn apply(&self, script: &SqlScript, variables: &Variables) -> Result<(), Error> {
        match self.transaction_mode {
            TransactionMode::NoTransaction => {
                self.executor.execute(script, Some(variables))?;
                self.journal.store_executed_script(script)
            }
            TransactionMode::TransactionPerScript => {
                let dialect = self.connection_manager.dialect();
                self.connection_manager.with_managed_connection(|commands| {
                    if let Some(begin) = dialect.begin_transaction_sql() {
                        commands.create_command(begin).execute_non_query()?;
                    }
                    let result = self
                        .executor
                        .execute(script, Some(variables))
                        .and_then(|()| self.journal.store_executed_script(script));
                    match result {
                        Ok(()) => {
                            commands
                                .create_command(dialect.commit_transaction_sql())
                                .execute_non_query()?;
                            Ok(())
                        }
                        Err(error) => {
                            tracing::info!("Rolling back script");
                            if let Err(rollback_error) = commands
                                .create_command(dialect.rollback_transaction_sql())
                                .execute_non_query()
                            {
                                tracing::error!(error = %rollback_error, "Rollback failed");
                            }
                            Err(error)
                        }
                    }
                })
            }
        }
    }

    fn merged_variables(&self, variables: Option<&Variables>) -> Variables {
        let mut merged = self.variables.clone();
        if let Some(variables) = variables {
            merged.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}

fn check_unique(scripts: &[SqlScript]) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for script in scripts {
        if !seen.insert(script.name()) {
            return Err(Error::Generic(format!(
                "Duplicate script name: {}",
                script.name()
            )));
        }
    }
    Ok(())
}

/// Scripts not in `executed`, sorted ascending by name.
fn pending<'s>(scripts: &'s [SqlScript], executed: &[String]) -> Vec<&'s SqlScript> {
    let executed = executed.iter().map(String::as_str).collect::<HashSet<_>>();
    let mut pending = scripts
        .iter()
        .filter(|script| {
            let applied = executed.contains(script.name());
            if applied {
                tracing::debug!(script = script.name(), "Skipping script (already applied)");
            }
            !applied
        })
        .collect::<Vec<_>>();
    pending.sort_by(|a, b| a.name().cmp(b.name()));
    pending
}

/// Configures and builds an [`UpgradeEngine`] for one dialect and connection factory.
pub struct UpgradeEngineBuilder {
    dialect: Box<dyn Dialect>,
    factory: Box<dyn ConnectionFactory>,
    log: Rc<dyn UpgradeLog>,
    schema: Option<String>,
    journal_schema: Option<String>,
    journal_table: Option<String>,
    variables_enabled: bool,
    strict_variables: bool,
    variables: Variables,
    preprocessors: Vec<Box<dyn ScriptPreprocessor>>,
    execution_timeout: Option<Duration>,
    transaction_mode: TransactionMode,
    session_setup: Vec<String>,
    on_script_start: Option<StartHook>,
    on_script_complete: Option<CompleteHook>,
    on_script_error: Option<ErrorHook>,
}

impl std::fmt::Debug for UpgradeEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeEngineBuilder")
            .field("dialect", &self.dialect)
            .field("schema", &self.schema)
            .field("journal_schema", &self.journal_schema)
            .field("journal_table", &self.journal_table)
            .field("variables_enabled", &self.variables_enabled)
            .field("variables", &self.variables)
            .field("execution_timeout", &self.execution_timeout)
            .field("transaction_mode", &self.transaction_mode)
            .finish()
    }
}

impl UpgradeEngineBuilder {
    pub fn new(dialect: impl Dialect + 'static, factory: impl ConnectionFactory + 'static) -> Self {
        Self::from_boxed(Box::new(dialect), Box::new(factory))
    }

    pub fn from_boxed(dialect: Box<dyn Dialect>, factory: Box<dyn ConnectionFactory>) -> Self {
        Self {
            dialect,
            factory,
            log: Rc::new(TracingLog),
            schema: None,
            journal_schema: None,
            journal_table: None,
            variables_enabled: true,
            strict_variables: false,
            variables: Variables::new(),
            preprocessors: Vec::new(),
            execution_timeout: None,
            transaction_mode: TransactionMode::default(),
            session_setup: Vec::new(),
            on_script_start: None,
            on_script_complete: None,
            on_script_error: None,
        }
    }

    /// Schema the scripts target. Also the journal's schema unless one is set explicitly.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Journal table location. Defaults to the dialect's default table.
    pub fn with_journal_table(mut self, schema: Option<&str>, table: impl Into<String>) -> Self {
        self.journal_schema = schema.map(str::to_string);
        self.journal_table = Some(table.into());
        self
    }

    pub fn with_variables_enabled(mut self, enabled: bool) -> Self {
        self.variables_enabled = enabled;
        self
    }

    pub fn with_strict_variables(mut self, strict: bool) -> Self {
        self.strict_variables = strict;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: impl ScriptPreprocessor + 'static) -> Self {
        self.preprocessors.push(Box::new(preprocessor));
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Where progress is written. Defaults to [`TracingLog`].
    pub fn with_log(mut self, log: Rc<dyn UpgradeLog>) -> Self {
        self.log = log;
        self
    }

    pub fn with_transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    pub fn with_session_setup<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.session_setup
            .extend(statements.into_iter().map(Into::into));
        self
    }

    pub fn on_script_start<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_script_start = Some(Box::new(callback));
        self
    }

    pub fn on_script_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.on_script_complete = Some(Box::new(callback));
        self
    }

    pub fn on_script_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &Error) + Send + Sync + 'static,
    {
        self.on_script_error = Some(Box::new(callback));
        self
    }

    /// Build the engine. Fails if the journal table name is rejected by the dialect.
    pub fn build(self) -> Result<UpgradeEngine, Error> {
        let default_journal = self.dialect.default_journal_table();
        let journal_schema = match (&self.journal_schema, &self.journal_table) {
            (Some(schema), _) => Some(schema.clone()),
            (None, Some(_)) => None,
            (None, None) => match &self.schema {
                Some(schema) if self.dialect.supports_schemas() => Some(schema.clone()),
                _ => default_journal.schema.map(str::to_string),
            },
        };
        let journal_table = self
            .journal_table
            .clone()
            .unwrap_or_else(|| default_journal.table.to_string());

        let connection_manager = Rc::new(
            ConnectionManager::from_boxed(self.dialect, self.factory)
                .with_session_setup(self.session_setup),
        );

        let mut executor = ScriptExecutor::new(Rc::clone(&connection_manager), Rc::clone(&self.log))
            .with_variables_enabled(self.variables_enabled)
            .with_strict_variables(self.strict_variables)
            .with_execution_timeout(self.execution_timeout);
        if let Some(schema) = self.schema {
            executor = executor.with_schema(schema);
        }
        for preprocessor in self.preprocessors {
            executor = executor.with_boxed_preprocessor(preprocessor);
        }

        let journal = TableJournal::try_new(
            Rc::clone(&connection_manager),
            Rc::clone(&self.log),
            journal_schema.as_deref(),
            &journal_table,
        )?;

        Ok(UpgradeEngine {
            connection_manager,
            executor,
            journal,
            log: self.log,
            variables: self.variables,
            transaction_mode: self.transaction_mode,
            on_script_start: self.on_script_start,
            on_script_complete: self.on_script_complete,
            on_script_error: self.on_script_error,
        })
    }
}
