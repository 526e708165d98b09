//! Database dialects.
//!
//! A [`Dialect`] bundles everything that differs between database engines: how identifiers
//! are quoted, where one statement ends and the next begins, the journal table's DDL and
//! DML, and whether the engine has schemas at all. One dialect is chosen when an engine is
//! built and is shared, read-only, by the connection manager, executor and journal.

use crate::error::Error;
use crate::quoting::{string_literal, ObjectNameOptions};
use chrono::{DateTime, Utc};

mod mysql;
mod oracle;
mod postgres;
mod sqlite;
mod sqlserver;

pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

/// The journal table a dialect uses when none is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalTableName {
    pub schema: Option<&'static str>,
    pub table: &'static str,
}

/// Engine-specific rules needed to run scripts and keep the journal.
pub trait Dialect: std::fmt::Debug {
    /// Human-readable engine name, used in log messages.
    fn name(&self) -> &'static str;

    /// Quote an identifier for this engine.
    fn quote_with_options(&self, name: &str, options: ObjectNameOptions) -> Result<String, Error>;

    /// Quote an identifier, trimming surrounding whitespace.
    fn quote(&self, name: &str) -> Result<String, Error> {
        self.quote_with_options(name, ObjectNameOptions::Trim)
    }

    /// Render `value` as a string literal this engine reads back unchanged.
    fn string_literal(&self, value: &str) -> String {
        string_literal(value)
    }

    /// Split preprocessed script text into the statements to execute, in order.
    fn split_into_statements(&self, contents: &str) -> Vec<String>;

    fn default_journal_table(&self) -> JournalTableName;

    /// `table` is already quoted and schema-qualified.
    fn create_journal_table_sql(&self, table: &str) -> String;

    fn insert_journal_entry_sql(&self, table: &str, script_name: &str, applied: DateTime<Utc>)
        -> String;

    /// Names of executed scripts, one per row in the first column, ascending.
    fn executed_scripts_sql(&self, table: &str) -> String;

    /// Name and applied timestamp (as `YYYY-MM-DD HH:MM:SS` text) per row, ordered by name.
    fn journal_history_sql(&self, table: &str) -> String;

    /// A query that fails when the journal table does not exist.
    fn journal_table_exists_sql(&self, table: &str) -> String {
        format!("select count(*) from {}", table)
    }

    /// Whether the engine has schemas that can be verified or created.
    fn supports_schemas(&self) -> bool {
        true
    }

    /// SQL that creates `schema` when it does not exist yet.
    ///
    /// Fails with [`Error::InvalidObjectName`] when `schema` cannot be quoted. Only called
    /// when [`Dialect::supports_schemas`] is true; dialects without schemas keep the default,
    /// which panics.
    fn verify_schema_sql(&self, schema: &str) -> Result<String, Error> {
        panic!(
            "Dialect {} has no schemas; verify_schema_sql('{}') must not be called",
            self.name(),
            schema
        )
    }

    /// Statements run on every new connection once a run has started.
    fn session_setup_sql(&self) -> Vec<String> {
        Vec::new()
    }

    /// Statement that opens a transaction, or `None` when transactions begin implicitly.
    fn begin_transaction_sql(&self) -> Option<&'static str> {
        Some("BEGIN")
    }

    fn commit_transaction_sql(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_transaction_sql(&self) -> &'static str {
        "ROLLBACK"
    }
}

/// Timestamp layout written into the journal.
pub(crate) const JOURNAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn applied() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 17, 5, 1).unwrap()
    }

    fn all() -> Vec<Box<dyn Dialect>> {
        vec![
            Box::new(SqlServerDialect),
            Box::new(OracleDialect),
            Box::new(SqliteDialect),
            Box::new(PostgresDialect),
            Box::new(MysqlDialect),
        ]
    }

    #[test]
    fn insert_escapes_script_names() {
        for dialect in all() {
            let sql = dialect.insert_journal_entry_sql("J", "o'brien.sql", applied());
            assert!(
                sql.contains("'o''brien.sql'"),
                "{} did not escape: {}",
                dialect.name(),
                sql
            );
            assert!(sql.contains("2024-03-09"), "{}: {}", dialect.name(), sql);
        }
    }

    #[test]
    fn verify_schema_rejects_unquotable_names() {
        let long = "s".repeat(200);
        for dialect in all().into_iter().filter(|d| d.supports_schemas()) {
            assert!(
                matches!(
                    dialect.verify_schema_sql(&long),
                    Err(Error::InvalidObjectName { .. })
                ),
                "{} accepted an over-long schema",
                dialect.name()
            );
            assert!(dialect.verify_schema_sql("  ").is_err(), "{}", dialect.name());
        }
    }

    #[test]
    fn default_journal_tables_quote_cleanly() {
        for dialect in all() {
            let name = dialect.default_journal_table();
            assert!(dialect.quote(name.table).is_ok());
            if let Some(schema) = name.schema {
                assert!(dialect.quote(schema).is_ok());
            }
        }
    }

    #[test]
    fn existence_probe_is_a_plain_count() {
        assert_eq!(
            SqliteDialect.journal_table_exists_sql("\"SchemaVersions\""),
            "select count(*) from \"SchemaVersions\""
        );
    }
}
