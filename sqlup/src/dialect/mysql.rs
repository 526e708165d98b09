use super::{Dialect, JournalTableName, JOURNAL_TIMESTAMP_FORMAT};
use crate::error::Error;
use crate::quoting::{delimit, string_literal, ObjectNameOptions};
use crate::split::{split_on_terminator, TerminatorRules};
use chrono::{DateTime, Utc};

/// MySQL: `` `backtick` `` quoting, `;` terminated statements.
///
/// A MySQL schema is a database; verifying one creates the database when missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

const MAX_IDENTIFIER_LENGTH: usize = 64;

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn quote_with_options(&self, name: &str, options: ObjectNameOptions) -> Result<String, Error> {
        delimit(name, options, '`', '`', MAX_IDENTIFIER_LENGTH)
    }

    // Backslash is an escape character in MySQL strings unless NO_BACKSLASH_ESCAPES is set
    fn string_literal(&self, value: &str) -> String {
        string_literal(&value.replace('\\', "\\\\"))
    }

    fn split_into_statements(&self, contents: &str) -> Vec<String> {
        split_on_terminator(
            contents,
            TerminatorRules {
                backtick_identifiers: true,
                backslash_escapes: true,
                ..TerminatorRules::default()
            },
        )
    }

    fn default_journal_table(&self) -> JournalTableName {
        JournalTableName {
            schema: None,
            table: "schemaversions",
        }
    }

    fn create_journal_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {} (schemaversionid INT NOT NULL AUTO_INCREMENT, scriptname VARCHAR(255) NOT NULL, applied TIMESTAMP NOT NULL, PRIMARY KEY (schemaversionid))",
            table
        )
    }

    fn insert_journal_entry_sql(&self, table: &str, script_name: &str, applied: DateTime<Utc>) -> String {
        format!(
            "INSERT INTO {} (scriptname, applied) VALUES ({}, '{}')",
            table,
            self.string_literal(script_name),
            applied.format(JOURNAL_TIMESTAMP_FORMAT)
        )
    }

    fn executed_scripts_sql(&self, table: &str) -> String {
        format!("SELECT scriptname FROM {} ORDER BY scriptname", table)
    }

    fn journal_history_sql(&self, table: &str) -> String {
        format!(
            "SELECT scriptname, DATE_FORMAT(applied, '%Y-%m-%d %H:%i:%s') FROM {} ORDER BY scriptname",
            table
        )
    }

    fn verify_schema_sql(&self, schema: &str) -> Result<String, Error> {
        Ok(format!("CREATE SCHEMA IF NOT EXISTS {}", self.quote(schema)?))
    }

    fn begin_transaction_sql(&self) -> Option<&'static str> {
        Some("START TRANSACTION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn quotes_with_backticks() {
        assert_eq!(MysqlDialect.quote("my`table").unwrap(), "`my``table`");
    }

    #[test]
    fn splitting_honours_backticks() {
        assert_eq!(
            MysqlDialect.split_into_statements("create table `a;b` (id int); drop table `a;b`"),
            vec!["create table `a;b` (id int)", "drop table `a;b`"]
        );
    }

    #[test]
    fn splitting_honours_backslash_escapes() {
        assert_eq!(
            MysqlDialect.split_into_statements("INSERT INTO t VALUES ('it\\'s; fine');\nSELECT 1;"),
            vec!["INSERT INTO t VALUES ('it\\'s; fine')", "SELECT 1"]
        );
        assert_eq!(
            MysqlDialect.split_into_statements("SELECT 'a\\\\'; SELECT `b\\`;"),
            vec!["SELECT 'a\\\\'", "SELECT `b\\`"]
        );
    }

    #[test]
    fn journal_insert_doubles_backslashes() {
        let applied = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            MysqlDialect.insert_journal_entry_sql("`schemaversions`", "scripts\\new's.sql", applied),
            "INSERT INTO `schemaversions` (scriptname, applied) VALUES ('scripts\\\\new''s.sql', '2024-01-02 03:04:05')"
        );
    }

    #[test]
    fn verify_schema_quotes_name() {
        assert_eq!(
            MysqlDialect.verify_schema_sql("app").unwrap(),
            "CREATE SCHEMA IF NOT EXISTS `app`"
        );
    }

    #[test]
    fn history_formats_timestamp_in_sql() {
        assert!(MysqlDialect
            .journal_history_sql("`schemaversions`")
            .contains("DATE_FORMAT(applied, '%Y-%m-%d %H:%i:%s')"));
    }
}
