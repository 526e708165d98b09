//! Applies one script: preprocess, split, then execute every statement in order.

use crate::connection::ConnectionManager;
use crate::core::{SqlScript, Variables, SCHEMA_VARIABLE};
use crate::error::Error;
use crate::log::UpgradeLog;
use crate::preprocess::{preprocess, ScriptPreprocessor, VariableSubstitution};
use std::rc::Rc;
use std::time::Duration;

/// Runs scripts against the database of a [`ConnectionManager`].
///
/// The executor never touches the journal; recording a script is up to the caller once
/// [`ScriptExecutor::execute`] has returned `Ok`.
pub struct ScriptExecutor {
    connection_manager: Rc<ConnectionManager>,
    log: Rc<dyn UpgradeLog>,
    schema: Option<String>,
    variables_enabled: bool,
    strict_variables: bool,
    preprocessors: Vec<Box<dyn ScriptPreprocessor>>,
    execution_timeout: Option<Duration>,
}

impl std::fmt::Debug for ScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptExecutor")
            .field("connection_manager", &self.connection_manager)
            .field("schema", &self.schema)
            .field("variables_enabled", &self.variables_enabled)
            .field("strict_variables", &self.strict_variables)
            .field("preprocessors", &self.preprocessors.len())
            .field("execution_timeout", &self.execution_timeout)
            .finish()
    }
}

impl ScriptExecutor {
    pub fn new(connection_manager: Rc<ConnectionManager>, log: Rc<dyn UpgradeLog>) -> Self {
        Self {
            connection_manager,
            log,
            schema: None,
            variables_enabled: true,
            strict_variables: false,
            preprocessors: Vec::new(),
            execution_timeout: None,
        }
    }

    /// Target schema. Scripts see it as the `$schema$` variable, quoted for the dialect.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Whether `$name$` tokens are substituted. Defaults to true.
    pub fn with_variables_enabled(mut self, enabled: bool) -> Self {
        self.variables_enabled = enabled;
        self
    }

    /// Fail with [`Error::Preprocess`] when a `$name$` token has no value instead of leaving it.
    pub fn with_strict_variables(mut self, strict: bool) -> Self {
        self.strict_variables = strict;
        self
    }

    /// Append a preprocessor. Preprocessors run after variable substitution, in the order added.
    pub fn with_preprocessor(mut self, preprocessor: impl ScriptPreprocessor + 'static) -> Self {
        self.preprocessors.push(Box::new(preprocessor));
        self
    }

    pub(crate) fn with_boxed_preprocessor(mut self, preprocessor: Box<dyn ScriptPreprocessor>) -> Self {
        self.preprocessors.push(preprocessor);
        self
    }

    /// Per-statement execution timeout. `None` uses the driver default.
    pub fn with_execution_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn connection_manager(&self) -> &Rc<ConnectionManager> {
        &self.connection_manager
    }

    /// Execute every statement of `script`, stopping at the first failure.
    ///
    /// A failing statement is reported as [`Error::Script`] carrying its zero-based index.
    pub fn execute(&self, script: &SqlScript, variables: Option<&Variables>) -> Result<(), Error> {
        let dialect = self.connection_manager.dialect();
        let mut variables = variables.cloned().unwrap_or_default();
        if let Some(schema) = &self.schema {
            if !variables.contains_key(SCHEMA_VARIABLE) {
                variables.insert(SCHEMA_VARIABLE.to_string(), dialect.quote(schema)?);
            }
        }

        self.log.write_information(&format!(
            "Executing {} script '{}'",
            dialect.name(),
            script.name()
        ));

        let substitution = self.variables_enabled.then(|| {
            if self.strict_variables {
                VariableSubstitution::strict(&variables)
            } else {
                VariableSubstitution::new(&variables)
            }
        });
        let contents = preprocess(
            script.contents(),
            self.schema.is_some(),
            substitution,
            &self.preprocessors,
        )?;
        let statements = self.connection_manager.split_into_statements(&contents);

        self.connection_manager.with_managed_connection(|commands| {
            for (index, statement) in statements.iter().enumerate() {
                tracing::debug!(script = script.name(), statement_index = index, "Executing statement");
                let result = commands
                    .create_command(statement.as_str())
                    .with_timeout(self.execution_timeout)
                    .execute_non_query();
                if let Err(error) = result {
                    self.log.write_error(&format!(
                        "Script '{}' failed at statement {}: {}",
                        script.name(),
                        index,
                        error
                    ));
                    return Err(Error::Script {
                        script: script.name().to_string(),
                        statement_index: index,
                        source: Box::new(error),
                    });
                }
            }
            Ok(())
        })
    }

    /// Create the configured schema when it does not exist.
    ///
    /// A no-op without a schema, or when the dialect has no schemas.
    pub fn verify_schema(&self) -> Result<(), Error> {
        let Some(schema) = &self.schema else {
            return Ok(());
        };
        let dialect = self.connection_manager.dialect();
        if !dialect.supports_schemas() {
            tracing::debug!(dialect = dialect.name(), "Dialect has no schemas, skipping verification");
            return Ok(());
        }
        let sql = dialect.verify_schema_sql(schema)?;
        self.connection_manager
            .with_managed_connection(|commands| commands.create_command(sql).execute_non_query())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, OracleDialect, PostgresDialect, SqlServerDialect, SqliteDialect};
    use crate::testing::{MockConnectionFactory, RecordingLog};

    fn executor(dialect: impl Dialect + 'static) -> (ScriptExecutor, MockConnectionFactory, Rc<RecordingLog>) {
        let factory = MockConnectionFactory::new();
        let log = Rc::new(RecordingLog::new());
        let manager = Rc::new(ConnectionManager::new(dialect, factory.clone()));
        (ScriptExecutor::new(manager, log.clone()), factory, log)
    }

    fn variables(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_variables_when_enabled() {
        let (executor, factory, _) = executor(OracleDialect);
        let script = SqlScript::new("Test", "create table $variable1$.Table");
        executor
            .execute(&script, Some(&variables(&[("variable1", "SCHEMA")])))
            .unwrap();
        assert_eq!(factory.non_query_texts(), vec!["create table SCHEMA.Table"]);
    }

    #[test]
    fn leaves_tokens_when_variables_disabled() {
        let (executor, factory, _) = executor(OracleDialect);
        let executor = executor.with_variables_enabled(false);
        let script = SqlScript::new("Test", "alter table t add c int default $columnDefault$");
        executor
            .execute(&script, Some(&variables(&[("columnDefault", "NULL")])))
            .unwrap();
        assert_eq!(
            factory.non_query_texts(),
            vec!["alter table t add c int default $columnDefault$"]
        );
    }

    #[test]
    fn unknown_variables_are_left_alone() {
        let (executor, factory, _) = executor(OracleDialect);
        let script = SqlScript::new("Test", "select '$notdefined$' from dual");
        executor.execute(&script, None).unwrap();
        assert_eq!(factory.non_query_texts(), vec!["select '$notdefined$' from dual"]);
    }

    #[test]
    fn strict_variables_fail_before_any_statement() {
        let (executor, factory, _) = executor(OracleDialect);
        let executor = executor.with_strict_variables(true);
        let script = SqlScript::new("Test", "select $missing$ from dual");
        let result = executor.execute(&script, None);
        assert_eq!(
            result,
            Err(Error::Preprocess("variable 'missing' has no value defined".to_string()))
        );
        assert_eq!(factory.connections_opened(), 0);
    }

    #[test]
    fn executes_each_batch() {
        let (executor, factory, _) = executor(OracleDialect);
        let script = SqlScript::new("Test", "create $schema$.Table\n/\nselect 1 from dual\n/\nselect 2 from dual");
        executor.execute(&script, None).unwrap();
        assert_eq!(
            factory.non_query_texts(),
            vec!["create Table", "select 1 from dual", "select 2 from dual"]
        );
        assert_eq!(factory.connections_opened(), 1);
    }

    #[test]
    fn ignores_empty_batches() {
        let (executor, factory, _) = executor(OracleDialect);
        let script = SqlScript::new("Test", "A\n/\nB\n/\n\n/\nC");
        executor.execute(&script, None).unwrap();
        assert_eq!(factory.non_query_texts(), vec!["A", "B", "C"]);
    }

    #[test]
    fn stops_at_the_first_failing_statement() {
        let (executor, factory, log) = executor(OracleDialect);
        factory.fail_when("second", "ORA-00942: table or view does not exist");
        let script = SqlScript::new("0002.sql", "first\n/\nsecond\n/\nthird");

        let error = executor.execute(&script, None).unwrap_err();

        assert_eq!(error.statement_index(), Some(1));
        assert_eq!(
            error,
            Error::Script {
                script: "0002.sql".to_string(),
                statement_index: 1,
                source: Box::new(Error::Database(
                    "ORA-00942: table or view does not exist".to_string()
                )),
            }
        );
        assert_eq!(factory.successful_non_queries(), vec!["first"]);
        assert!(!factory.non_query_texts().contains(&"third".to_string()));
        assert_eq!(factory.connections_closed(), 1);
        assert_eq!(log.errors().len(), 1);
        assert!(log.errors()[0].contains("'0002.sql'"));
    }

    #[test]
    fn injects_quoted_schema() {
        let (executor, factory, log) = executor(SqlServerDialect);
        let executor = executor.with_schema("sales");
        let script = SqlScript::new("Test", "create table $schema$.[Orders] (id int)");
        executor.execute(&script, None).unwrap();
        assert_eq!(
            factory.non_query_texts(),
            vec!["create table [sales].[Orders] (id int)"]
        );
        assert_eq!(log.information(), vec!["Executing SQL Server script 'Test'"]);
    }

    #[test]
    fn caller_schema_variable_wins() {
        let (executor, factory, _) = executor(SqlServerDialect);
        let executor = executor.with_schema("sales");
        let script = SqlScript::new("Test", "select * from $schema$.t");
        executor
            .execute(&script, Some(&variables(&[("schema", "[other]")])))
            .unwrap();
        assert_eq!(factory.non_query_texts(), vec!["select * from [other].t"]);
    }

    #[test]
    fn strips_schema_qualifier_without_schema() {
        let (executor, factory, _) = executor(SqliteDialect);
        let script = SqlScript::new("Test", "create table $schema$.t (id int);");
        executor.execute(&script, None).unwrap();
        assert_eq!(factory.non_query_texts(), vec!["create table t (id int)"]);
    }

    #[test]
    fn extra_preprocessors_see_resolved_variables() {
        let (executor, factory, _) = executor(SqliteDialect);
        let executor = executor.with_preprocessor(|text: &str| -> Result<String, Error> {
            Ok(text.to_uppercase())
        });
        let script = SqlScript::new("Test", "select '$v$'");
        executor
            .execute(&script, Some(&variables(&[("v", "value")])))
            .unwrap();
        assert_eq!(factory.non_query_texts(), vec!["SELECT 'VALUE'"]);
    }

    #[test]
    fn applies_timeout_to_every_statement() {
        let (executor, factory, _) = executor(SqliteDialect);
        let executor = executor.with_execution_timeout(Some(Duration::from_secs(45)));
        executor
            .execute(&SqlScript::new("Test", "select 1; select 2;"), None)
            .unwrap();
        let commands = factory.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands
            .iter()
            .all(|c| c.timeout == Some(Duration::from_secs(45))));
    }

    #[test]
    fn verify_schema_without_schema_does_nothing() {
        let (executor, factory, _) = executor(SqlServerDialect);
        executor.verify_schema().unwrap();
        assert_eq!(factory.connections_opened(), 0);
    }

    #[test]
    fn verify_schema_is_a_noop_without_schema_support() {
        let (executor, factory, _) = executor(OracleDialect);
        let executor = executor.with_schema("DBUP");
        executor.verify_schema().unwrap();
        assert!(factory.commands().is_empty());
    }

    #[test]
    fn verify_schema_runs_dialect_sql() {
        let (executor, factory, _) = executor(SqlServerDialect);
        let executor = executor.with_schema("sales");
        executor.verify_schema().unwrap();
        assert_eq!(
            factory.non_query_texts(),
            vec!["IF NOT EXISTS (SELECT * FROM sys.schemas WHERE name = N'sales') Exec('CREATE SCHEMA [sales]')"]
        );
    }

    #[test]
    fn verify_schema_rejects_over_long_name_before_connecting() {
        let (executor, factory, _) = executor(PostgresDialect);
        let executor = executor.with_schema("s".repeat(64));
        let result = executor.verify_schema();
        assert!(matches!(result, Err(Error::InvalidObjectName { .. })));
        assert_eq!(factory.connections_opened(), 0);
    }

    #[test]
    fn connection_failure_is_not_wrapped() {
        let (executor, factory, _) = executor(SqliteDialect);
        factory.fail_to_open("no route to host");
        let result = executor.execute(&SqlScript::new("Test", "select 1"), None);
        assert_eq!(result, Err(Error::Connection("no route to host".to_string())));
    }
}
