use super::{Dialect, JournalTableName, JOURNAL_TIMESTAMP_FORMAT};
use crate::error::Error;
use crate::quoting::{validate, ObjectNameOptions};
use crate::split::split_on_slash_lines;
use chrono::{DateTime, Utc};

/// Oracle: identifiers pass through unquoted, statements are separated by a `/` line, and
/// there is no separate schema to verify (a schema is a user).
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "Oracle"
    }

    fn quote_with_options(&self, name: &str, options: ObjectNameOptions) -> Result<String, Error> {
        match options {
            ObjectNameOptions::None => Ok(name.to_string()),
            ObjectNameOptions::Trim => validate(name, options).map(str::to_string),
        }
    }

    fn split_into_statements(&self, contents: &str) -> Vec<String> {
        split_on_slash_lines(contents)
    }

    fn default_journal_table(&self) -> JournalTableName {
        JournalTableName {
            schema: Some("DBUP"),
            table: "SCHEMA_VERSIONS",
        }
    }

    fn create_journal_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {} (ID VARCHAR2(32) DEFAULT sys_guid() NOT NULL PRIMARY KEY, SCRIPT_NAME VARCHAR2(255) NOT NULL, APPLIED DATE NOT NULL)",
            table
        )
    }

    fn insert_journal_entry_sql(&self, table: &str, script_name: &str, applied: DateTime<Utc>) -> String {
        format!(
            "INSERT INTO {} (SCRIPT_NAME, APPLIED) VALUES ({}, TO_DATE('{}', 'yyyy-mm-dd hh24:mi:ss'))",
            table,
            self.string_literal(script_name),
            applied.format(JOURNAL_TIMESTAMP_FORMAT)
        )
    }

    fn executed_scripts_sql(&self, table: &str) -> String {
        format!("SELECT SCRIPT_NAME FROM {} ORDER BY SCRIPT_NAME", table)
    }

    fn journal_history_sql(&self, table: &str) -> String {
        format!(
            "SELECT SCRIPT_NAME, TO_CHAR(APPLIED, 'YYYY-MM-DD HH24:MI:SS') FROM {} ORDER BY SCRIPT_NAME",
            table
        )
    }

    fn journal_table_exists_sql(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", table)
    }

    fn supports_schemas(&self) -> bool {
        false
    }

    fn begin_transaction_sql(&self) -> Option<&'static str> {
        None
    }
}
