use super::{Dialect, JournalTableName, JOURNAL_TIMESTAMP_FORMAT};
use crate::error::Error;
use crate::quoting::{delimit, ObjectNameOptions};
use crate::split::{split_on_terminator, TerminatorRules};
use chrono::{DateTime, Utc};

/// SQLite: `"double quote"` quoting, `;` terminated statements, a single namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn quote_with_options(&self, name: &str, options: ObjectNameOptions) -> Result<String, Error> {
        delimit(name, options, '"', '"', usize::MAX)
    }

    fn split_into_statements(&self, contents: &str) -> Vec<String> {
        split_on_terminator(
            contents,
            TerminatorRules {
                trigger_bodies: true,
                ..TerminatorRules::default()
            },
        )
    }

    fn default_journal_table(&self) -> JournalTableName {
        JournalTableName {
            schema: None,
            table: "SchemaVersions",
        }
    }

    fn create_journal_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {} (SchemaVersionID INTEGER CONSTRAINT PK_SchemaVersions_SchemaVersionID PRIMARY KEY AUTOINCREMENT NOT NULL, ScriptName TEXT NOT NULL, Applied DATETIME NOT NULL)",
            table
        )
    }

    fn insert_journal_entry_sql(&self, table: &str, script_name: &str, applied: DateTime<Utc>) -> String {
        format!(
            "insert into {} (ScriptName, Applied) values ({}, '{}')",
            table,
            self.string_literal(script_name),
            applied.format(JOURNAL_TIMESTAMP_FORMAT)
        )
    }

    fn executed_scripts_sql(&self, table: &str) -> String {
        format!("select ScriptName from {} order by ScriptName", table)
    }

    fn journal_history_sql(&self, table: &str) -> String {
        format!("select ScriptName, Applied from {} order by ScriptName", table)
    }

    fn supports_schemas(&self) -> bool {
        false
    }
}
