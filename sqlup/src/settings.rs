//! Declarative engine configuration.
//!
//! ```
//! use sqlup::{DialectKind, UpgradeSettings};
//!
//! let settings = UpgradeSettings::from_json(r#"{
//!     "dialect": "postgres",
//!     "schema": "app",
//!     "variables": { "owner": "app_user" },
//!     "execution_timeout_secs": 300,
//!     "transaction_mode": "transaction_per_script"
//! }"#).unwrap();
//! assert_eq!(settings.dialect, DialectKind::Postgres);
//! assert!(settings.variables_enabled);
//! ```

use crate::connection::ConnectionFactory;
use crate::core::Variables;
use crate::dialect::{
    Dialect, MysqlDialect, OracleDialect, PostgresDialect, SqlServerDialect, SqliteDialect,
};
use crate::engine::{TransactionMode, UpgradeEngine, UpgradeEngineBuilder};
use crate::error::Error;
use serde::Deserialize;
use std::time::Duration;

/// Which dialect to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    SqlServer,
    Oracle,
    Sqlite,
    Postgres,
    Mysql,
}

impl DialectKind {
    pub fn dialect(self) -> Box<dyn Dialect> {
        match self {
            DialectKind::SqlServer => Box::new(SqlServerDialect),
            DialectKind::Oracle => Box::new(OracleDialect),
            DialectKind::Sqlite => Box::new(SqliteDialect),
            DialectKind::Postgres => Box::new(PostgresDialect),
            DialectKind::Mysql => Box::new(MysqlDialect),
        }
    }
}

/// Settings for an [`UpgradeEngine`], usually read from a JSON file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeSettings {
    pub dialect: DialectKind,
    /// Schema the scripts target.
    #[serde(default)]
    pub schema: Option<String>,
    /// Journal schema (default: the target schema, or the dialect's default).
    #[serde(default)]
    pub journal_schema: Option<String>,
    /// Journal table (default: the dialect's default).
    #[serde(default)]
    pub journal_table: Option<String>,
    #[serde(default = "default_variables_enabled")]
    pub variables_enabled: bool,
    #[serde(default)]
    pub strict_variables: bool,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub execution_timeout_secs: Option<u64>,
    #[serde(default)]
    pub transaction_mode: TransactionMode,
    /// Statements run on every new connection.
    #[serde(default)]
    pub session_setup: Vec<String>,
}

fn default_variables_enabled() -> bool {
    true
}

impl UpgradeSettings {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let settings: UpgradeSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.journal_schema.is_some() && self.journal_table.is_none() {
            return Err(Error::Config(
                "journal_schema requires journal_table".to_string(),
            ));
        }
        if self.execution_timeout_secs == Some(0) {
            return Err(Error::Config(
                "execution_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Start a builder from these settings, for further programmatic configuration.
    pub fn builder(&self, factory: impl ConnectionFactory + 'static) -> Result<UpgradeEngineBuilder, Error> {
        self.validate()?;
        let mut builder = UpgradeEngineBuilder::from_boxed(self.dialect.dialect(), Box::new(factory))
            .with_variables_enabled(self.variables_enabled)
            .with_strict_variables(self.strict_variables)
            .with_execution_timeout(self.execution_timeout_secs.map(Duration::from_secs))
            .with_transaction_mode(self.transaction_mode)
            .with_session_setup(self.session_setup.iter().cloned());
        if let Some(schema) = &self.schema {
            builder = builder.with_schema(schema.as_str());
        }
        if let Some(table) = &self.journal_table {
            builder = builder.with_journal_table(self.journal_schema.as_deref(), table.as_str());
        }
        for (name, value) in &self.variables {
            builder = builder.with_variable(name.as_str(), value.as_str());
        }
        Ok(builder)
    }

    pub fn build(&self, factory: impl ConnectionFactory + 'static) -> Result<UpgradeEngine, Error> {
        self.builder(factory)?.build()
    }
}
