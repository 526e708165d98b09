#![cfg_attr(docsrs, feature(doc_cfg))]
//! `sqlup` applies an ordered set of SQL scripts to a database, each exactly once, and keeps
//! a journal table recording which scripts have run.
//!
//! Core concepts:
//! - A [`SqlScript`] is a name plus SQL text. The name is its identity: it is what the
//!   journal records, and scripts run in ascending name order.
//! - A [`Dialect`] captures what differs between engines: identifier quoting, how a script is
//!   split into statements, the journal table's SQL and schema handling.
//! - The [`UpgradeEngine`] reads the journal, runs every pending script through the
//!   [`ScriptExecutor`] and records each success in the [`TableJournal`].
//!
//! # Running scripts
//!
//! ```
//! # #[cfg(feature = "sqlite")]
//! # {
//! use sqlup::sqlite::SqliteConnectionFactory;
//! use sqlup::{SqlScript, SqliteDialect, UpgradeEngineBuilder};
//!
//! # let dir = tempfile::tempdir().unwrap();
//! # let path = dir.path().join("app.db");
//! let engine = UpgradeEngineBuilder::new(SqliteDialect, SqliteConnectionFactory::new(&path))
//!     .with_variable("default_status", "'active'")
//!     .build()
//!     .unwrap();
//!
//! let scripts = vec![
//!     SqlScript::new("0002_status.sql", "ALTER TABLE users ADD COLUMN status TEXT DEFAULT $default_status$;"),
//!     SqlScript::new("0001_users.sql", "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);"),
//! ];
//! let report = engine.run(&scripts, None).unwrap();
//! assert!(report.is_successful());
//! assert_eq!(report.scripts_run, vec!["0001_users.sql", "0002_status.sql"]);
//!
//! // a second run finds nothing left to do
//! assert!(engine.run(&scripts, None).unwrap().scripts_run.is_empty());
//! # }
//! ```
//!
//! # Failure behaviour
//!
//! The run stops at the first failing statement. Scripts before the failing one stay
//! journaled; the failing script is not journaled and runs again on the next run. The error
//! carries the zero-based index of the failing statement (see [`Error::statement_index`]).
//!
//! By default statements run in autocommit mode and the journal row is written after the
//! script, in its own scope. [`TransactionMode::TransactionPerScript`] wraps each script and
//! its journal row in one transaction instead.
//!
//! # Preprocessing
//!
//! Before a script is split, `$schema$.` is removed when no schema is configured, `$name$`
//! tokens are replaced from the run's variables (unless disabled) and any additional
//! [`ScriptPreprocessor`]s run in the order they were added.
//!
//! # Logging
//!
//! Progress lines go to an [`UpgradeLog`]; the default [`TracingLog`] forwards them to
//! [`tracing`]. Each script additionally runs inside a `script` span.
//!
//! # Database support
//!
//! - [`SQLite`](sqlite) - available with the `sqlite` feature flag (default).
//! - [`PostgreSQL`](postgres) - available with the `postgres` feature flag.
//! - [`MySQL`](mysql) - available with the `mysql` feature flag.
//! - SQL Server and Oracle dialects are always available; bring a [`ConnectionFactory`].

mod core;
pub use core::{ExecutedScript, ScriptFailure, SqlScript, UpgradeReport, Variables, SCHEMA_VARIABLE};

mod error;
pub use error::Error;

mod log;
pub use log::{TracingLog, UpgradeLog};

mod quoting;
pub use quoting::ObjectNameOptions;

pub mod preprocess;
pub use preprocess::{ScriptPreprocessor, StripSchema, VariableSubstitution};

pub mod split;

pub mod dialect;
pub use dialect::{
    Dialect, JournalTableName, MysqlDialect, OracleDialect, PostgresDialect, SqlServerDialect,
    SqliteDialect,
};

mod connection;
pub use connection::{CommandFactory, ConnectionFactory, ConnectionManager, DbCommand, DbConnection, Rows};

mod executor;
pub use executor::ScriptExecutor;

mod journal;
pub use journal::TableJournal;

mod engine;
pub use engine::{TransactionMode, UpgradeEngine, UpgradeEngineBuilder};

mod settings;
pub use settings::{DialectKind, UpgradeSettings};

#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;

#[cfg(feature = "mysql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mysql")))]
pub mod mysql;

#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(all(test, feature = "mysql"))]
pub(crate) mod test_mysql;

#[cfg(all(test, feature = "postgres"))]
pub(crate) mod test_postgres;
