//! The journal table: which scripts have been applied, and when.

use crate::connection::{CommandFactory, ConnectionManager};
use crate::core::{ExecutedScript, SqlScript};
use crate::error::Error;
use crate::log::UpgradeLog;
use chrono::{NaiveDateTime, Utc};
use std::rc::Rc;

/// Journal kept in a table of the target database.
///
/// The table is created lazily by the first [`TableJournal::store_executed_script`]. Until
/// then the database is considered to be at its initial state.
pub struct TableJournal {
    connection_manager: Rc<ConnectionManager>,
    log: Rc<dyn UpgradeLog>,
    qualified_name: String,
}

impl std::fmt::Debug for TableJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableJournal")
            .field("qualified_name", &self.qualified_name)
            .finish()
    }
}

impl TableJournal {
    /// Create a journal for `schema.table`, quoting both with the connection manager's
    /// dialect. Returns an error if either name is rejected by the dialect.
    pub fn try_new(
        connection_manager: Rc<ConnectionManager>,
        log: Rc<dyn UpgradeLog>,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Self, Error> {
        let dialect = connection_manager.dialect();
        let qualified_name = match schema {
            Some(schema) => format!("{}.{}", dialect.quote(schema)?, dialect.quote(table)?),
            None => dialect.quote(table)?,
        };
        Ok(Self {
            connection_manager,
            log,
            qualified_name,
        })
    }

    /// Create a journal, panicking if the table name is invalid.
    /// For a non-panicking version, use `try_new`.
    pub fn new(
        connection_manager: Rc<ConnectionManager>,
        log: Rc<dyn UpgradeLog>,
        schema: Option<&str>,
        table: &str,
    ) -> Self {
        match Self::try_new(connection_manager, log, schema, table) {
            Ok(journal) => journal,
            Err(err) => panic!("{}", err),
        }
    }

    /// Create a journal in the dialect's default table.
    pub fn with_default_table(connection_manager: Rc<ConnectionManager>, log: Rc<dyn UpgradeLog>) -> Self {
        let name = connection_manager.dialect().default_journal_table();
        Self::new(connection_manager, log, name.schema, name.table)
    }

    /// The quoted, schema-qualified table name used in SQL.
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Names of all recorded scripts, ascending.
    ///
    /// A missing journal table yields an empty list; only the existence probe is issued.
    pub fn get_executed_scripts(&self) -> Result<Vec<String>, Error> {
        self.log.write_information("Fetching list of already executed scripts.");
        self.connection_manager.with_managed_connection(|commands| {
            if !self.probe(commands) {
                self.log_missing();
                return Ok(Vec::new());
            }
            let sql = self
                .connection_manager
                .dialect()
                .executed_scripts_sql(&self.qualified_name);
            let mut names = commands
                .create_command(sql)
                .execute_reader()?
                .into_iter()
                .filter_map(|row| row.into_iter().next().flatten())
                .collect::<Vec<_>>();
            names.sort();
            Ok(names)
        })
    }

    /// Journal rows with their applied timestamps, ordered by script name.
    pub fn history(&self) -> Result<Vec<ExecutedScript>, Error> {
        self.connection_manager.with_managed_connection(|commands| {
            if !self.probe(commands) {
                self.log_missing();
                return Ok(Vec::new());
            }
            let sql = self
                .connection_manager
                .dialect()
                .journal_history_sql(&self.qualified_name);
            let mut history = commands
                .create_command(sql)
                .execute_reader()?
                .into_iter()
                .map(|row| {
                    let mut values = row.into_iter();
                    let script_name = values.next().flatten().ok_or_else(|| {
                        Error::Generic("journal row has no script name".to_string())
                    })?;
                    let applied_text = values.next().flatten().ok_or_else(|| {
                        Error::Generic(format!(
                            "journal row for '{}' has no applied timestamp",
                            script_name
                        ))
                    })?;
                    let applied = parse_applied(&applied_text).map_err(|e| {
                        Error::Generic(format!(
                            "Failed to parse applied timestamp '{}' of '{}': {}",
                            applied_text, script_name, e
                        ))
                    })?;
                    Ok(ExecutedScript {
                        script_name,
                        applied,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            history.sort_by(|a, b| a.script_name.cmp(&b.script_name));
            Ok(history)
        })
    }

    /// Whether the journal table exists. A failing probe counts as missing.
    pub fn table_exists(&self) -> Result<bool, Error> {
        self.connection_manager
            .with_managed_connection(|commands| Ok(self.probe(commands)))
    }

    /// Create the journal table if it is missing. Returns whether it already existed.
    pub fn ensure_table_exists(&self) -> Result<bool, Error> {
        if self.table_exists()? {
            return Ok(true);
        }
        self.log
            .write_information(&format!("Creating the {} table", self.qualified_name));
        let sql = self
            .connection_manager
            .dialect()
            .create_journal_table_sql(&self.qualified_name);
        self.connection_manager
            .with_managed_connection(|commands| commands.create_command(sql).execute_non_query())?;
        self.log.write_information(&format!(
            "The {} table has been created",
            self.qualified_name
        ));
        Ok(false)
    }

    /// Record `script` as applied now, creating the table first when needed.
    ///
    /// Creation and insertion use separate managed scopes, so they are only atomic when the
    /// caller wraps both in an outer scope with an open transaction.
    pub fn store_executed_script(&self, script: &SqlScript) -> Result<(), Error> {
        self.ensure_table_exists()?;
        let sql = self.connection_manager.dialect().insert_journal_entry_sql(
            &self.qualified_name,
            script.name(),
            Utc::now(),
        );
        self.connection_manager
            .with_managed_connection(|commands| commands.create_command(sql).execute_non_query())?;
        tracing::debug!(script = script.name(), journal = %self.qualified_name, "Recorded script");
        Ok(())
    }

    fn probe(&self, commands: &CommandFactory<'_>) -> bool {
        let sql = self
            .connection_manager
            .dialect()
            .journal_table_exists_sql(&self.qualified_name);
        match commands.create_command(sql).execute_scalar() {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!(error = %error, journal = %self.qualified_name, "Journal probe failed, treating table as missing");
                false
            }
        }
    }

    fn log_missing(&self) {
        self.log.write_information(&format!(
            "The {} table could not be found. The database is assumed to be at initial state.",
            self.qualified_name
        ));
    }
}

fn parse_applied(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
}
