use super::{Dialect, JournalTableName, JOURNAL_TIMESTAMP_FORMAT};
use crate::error::Error;
use crate::quoting::{delimit, ObjectNameOptions};
use crate::split::{split_on_terminator, TerminatorRules};
use chrono::{DateTime, Utc};

/// PostgreSQL: `"double quote"` quoting (63 character identifiers), `;` terminated statements
/// with dollar-quoted bodies, schemas created on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

const MAX_IDENTIFIER_LENGTH: usize = 63;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn quote_with_options(&self, name: &str, options: ObjectNameOptions) -> Result<String, Error> {
        delimit(name, options, '"', '"', MAX_IDENTIFIER_LENGTH)
    }

    fn split_into_statements(&self, contents: &str) -> Vec<String> {
        split_on_terminator(
            contents,
            TerminatorRules {
                dollar_quoting: true,
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
            "CREATE TABLE {} (schemaversionsid serial NOT NULL, scriptname character varying(255) NOT NULL, applied timestamp without time zone NOT NULL, CONSTRAINT pk_schemaversions_id PRIMARY KEY (schemaversionsid))",
            table
        )
    }

    fn insert_journal_entry_sql(&self, table: &str, script_name: &str, applied: DateTime<Utc>) -> String {
        format!(
            "insert into {} (scriptname, applied) values ({}, '{}')",
            table,
            self.string_literal(script_name),
            applied.format(JOURNAL_TIMESTAMP_FORMAT)
        )
    }

    fn executed_scripts_sql(&self, table: &str) -> String {
        format!("select scriptname from {} order by scriptname", table)
    }

    fn journal_history_sql(&self, table: &str) -> String {
        format!(
            "select scriptname, to_char(applied, 'YYYY-MM-DD HH24:MI:SS') from {} order by scriptname",
            table
        )
    }

    fn verify_schema_sql(&self, schema: &str) -> Result<String, Error> {
        Ok(format!("CREATE SCHEMA IF NOT EXISTS {}", self.quote(schema)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_schema_quotes_name() {
        assert_eq!(
            PostgresDialect.verify_schema_sql("app").unwrap(),
            "CREATE SCHEMA IF NOT EXISTS \"app\""
        );
        assert!(PostgresDialect.verify_schema_sql(&"s".repeat(64)).is_err());
    }

    #[test]
    fn splitting_keeps_function_bodies_whole() {
        let statements = PostgresDialect.split_into_statements(
            "create function one() returns int as $$ select 1; $$ language sql;\nselect one();",
        );
        assert_eq!(
            statements,
            vec![
                "create function one() returns int as $$ select 1; $$ language sql",
                "select one()"
            ]
        );
    }

    #[test]
    fn rejects_long_identifiers() {
        assert!(PostgresDialect.quote(&"t".repeat(64)).is_err());
    }
}
