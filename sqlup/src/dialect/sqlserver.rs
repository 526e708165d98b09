use super::{Dialect, JournalTableName};
use crate::error::Error;
use crate::quoting::{delimit, string_literal, validate, ObjectNameOptions};
use crate::split::split_on_go_lines;
use chrono::{DateTime, Utc};

/// Microsoft SQL Server: `[bracket]` quoting, `GO` batch separators, schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

/// Maximum length of a `sysname`.
const SYSNAME_LENGTH: usize = 128;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "SQL Server"
    }

    fn quote_with_options(&self, name: &str, options: ObjectNameOptions) -> Result<String, Error> {
        delimit(name, options, '[', ']', SYSNAME_LENGTH)
    }

    fn split_into_statements(&self, contents: &str) -> Vec<String> {
        split_on_go_lines(contents)
    }

    fn default_journal_table(&self) -> JournalTableName {
        JournalTableName {
            schema: Some("dbo"),
            table: "SchemaVersions",
        }
    }

    fn create_journal_table_sql(&self, table: &str) -> String {
        format!(
            "create table {} (\n\
             \t[Id] int identity(1,1) not null constraint PK_SchemaVersions_Id primary key,\n\
             \t[ScriptName] nvarchar(255) not null,\n\
             \t[Applied] datetime not null\n\
             )",
            table
        )
    }

    fn insert_journal_entry_sql(&self, table: &str, script_name: &str, applied: DateTime<Utc>) -> String {
        format!(
            "insert into {} (ScriptName, Applied) values ({}, '{}')",
            table,
            self.string_literal(script_name),
            applied.format("%Y-%m-%dT%H:%M:%S")
        )
    }

    fn executed_scripts_sql(&self, table: &str) -> String {
        format!("select [ScriptName] from {} order by [ScriptName]", table)
    }

    fn journal_history_sql(&self, table: &str) -> String {
        format!(
            "select [ScriptName], convert(varchar(19), [Applied], 120) from {} order by [ScriptName]",
            table
        )
    }

    fn verify_schema_sql(&self, schema: &str) -> Result<String, Error> {
        let quoted = self.quote(schema)?;
        let name = validate(schema, ObjectNameOptions::Trim)?;
        Ok(format!(
            "IF NOT EXISTS (SELECT * FROM sys.schemas WHERE name = N{}) Exec({})",
            string_literal(name),
            string_literal(&format!("CREATE SCHEMA {}", quoted))
        ))
    }

    fn begin_transaction_sql(&self) -> Option<&'static str> {
        Some("BEGIN TRANSACTION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn quotes_with_brackets() {
        assert_eq!(SqlServerDialect.quote(" dbo ").unwrap(), "[dbo]");
        assert_eq!(
            SqlServerDialect
                .quote_with_options(" dbo", ObjectNameOptions::None)
                .unwrap(),
            "[ dbo]"
        );
        assert!(SqlServerDialect.quote(&"a".repeat(129)).is_err());
    }

    #[test]
    fn journal_sql() {
        let table = "[dbo].[SchemaVersions]";
        let applied = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            SqlServerDialect.insert_journal_entry_sql(table, "001.sql", applied),
            "insert into [dbo].[SchemaVersions] (ScriptName, Applied) values ('001.sql', '2024-01-02T03:04:05')"
        );
        assert_eq!(
            SqlServerDialect.executed_scripts_sql(table),
            "select [ScriptName] from [dbo].[SchemaVersions] order by [ScriptName]"
        );
        assert!(SqlServerDialect
            .create_journal_table_sql(table)
            .starts_with("create table [dbo].[SchemaVersions] (\n\t[Id] int identity(1,1)"));
    }

    #[test]
    fn verify_schema_creates_missing_schema() {
        assert_eq!(
            SqlServerDialect.verify_schema_sql("sales").unwrap(),
            "IF NOT EXISTS (SELECT * FROM sys.schemas WHERE name = N'sales') Exec('CREATE SCHEMA [sales]')"
        );
    }

    #[test]
    fn splits_on_go() {
        assert_eq!(
            SqlServerDialect.split_into_statements("select 1\nGO\nselect 2"),
            vec!["select 1", "select 2"]
        );
    }
}
