//!
//! # SQLite support
//!
//! Connections are opened with the [`rusqlite`](https://crates.io/crates/rusqlite) crate.
//! Every managed scope opens the database file anew, so use a file path rather than
//! `:memory:` (an in-memory database would not outlive the scope that created it).
//!
//! SQLite has no per-statement timeout. The execution timeout is applied as the connection's
//! busy timeout instead, bounding how long a statement waits on a locked database.
//!
//! ## Example
//!
//! ```no_run
//! use sqlup::sqlite::SqliteConnectionFactory;
//! use sqlup::{SqlScript, SqliteDialect, UpgradeEngineBuilder};
//!
//! let engine = UpgradeEngineBuilder::new(SqliteDialect, SqliteConnectionFactory::new("app.db"))
//!     .build()
//!     .unwrap();
//! let scripts = vec![
//!     SqlScript::new("0001_users.sql", "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);"),
//!     SqlScript::new("0002_email.sql", "ALTER TABLE users ADD COLUMN email TEXT;"),
//! ];
//! let report = engine.run(&scripts, None).unwrap();
//! assert!(report.is_successful());
//! ```

use crate::connection::{ConnectionFactory, DbConnection, Rows};
use crate::error::Error;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

// Re-export rusqlite for callers building their own factories
pub use rusqlite;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens connections to a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteConnectionFactory {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteConnectionFactory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Set how long a statement waits on a locked database when no execution timeout is
    /// configured. Defaults to 30 seconds.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionFactory for SqliteConnectionFactory {
    fn open(&self) -> Result<Box<dyn DbConnection>, Error> {
        let conn = Connection::open(&self.path)
            .map_err(|e| Error::Connection(format!("{}: {}", self.path.display(), e)))?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(Box::new(SqliteConnection {
            conn,
            default_timeout: self.busy_timeout,
            current_timeout: self.busy_timeout,
        }))
    }
}

struct SqliteConnection {
    conn: Connection,
    default_timeout: Duration,
    current_timeout: Duration,
}

impl SqliteConnection {
    fn apply_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        let wanted = timeout.unwrap_or(self.default_timeout);
        if wanted != self.current_timeout {
            self.conn.busy_timeout(wanted)?;
            self.current_timeout = wanted;
        }
        Ok(())
    }
}

impl DbConnection for SqliteConnection {
    fn execute_non_query(&mut self, sql: &str, timeout: Option<Duration>) -> Result<u64, Error> {
        self.apply_timeout(timeout)?;
        self.conn.execute_batch(sql)?;
        Ok(self.conn.changes())
    }

    fn execute_scalar(&mut self, sql: &str, timeout: Option<Duration>) -> Result<Option<String>, Error> {
        let rows = self.execute_reader(sql, timeout)?;
        Ok(rows.into_iter().next().and_then(|row| row.into_iter().next().flatten()))
    }

    fn execute_reader(&mut self, sql: &str, timeout: Option<Duration>) -> Result<Rows, Error> {
        self.apply_timeout(timeout)?;
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..columns)
                    .map(|i| row.get_ref(i).map(value_to_string))
                    .collect::<Result<Vec<_>, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn value_to_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn factory() -> (SqliteConnectionFactory, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (SqliteConnectionFactory::new(dir.path().join("test.db")), dir)
    }

    #[test]
    fn reads_values_as_text() {
        let (factory, _dir) = factory();
        let mut conn = factory.open().unwrap();
        conn.execute_non_query(
            "CREATE TABLE t (i INTEGER, r REAL, s TEXT, n TEXT); INSERT INTO t VALUES (1, 2.5, 'x', NULL);",
            None,
        )
        .unwrap();
        let rows = conn.execute_reader("SELECT i, r, s, n FROM t", None).unwrap();
        assert_eq!(
            rows,
            vec![vec![
                Some("1".to_string()),
                Some("2.5".to_string()),
                Some("x".to_string()),
                None
            ]]
        );
        assert_eq!(
            conn.execute_scalar("SELECT count(*) FROM t", None).unwrap(),
            Some("1".to_string())
        );
    }

    #[test]
    fn reports_affected_rows() {
        let (factory, _dir) = factory();
        let mut conn = factory.open().unwrap();
        conn.execute_non_query("CREATE TABLE t (i INTEGER)", None).unwrap();
        conn.execute_non_query("INSERT INTO t VALUES (1), (2), (3)", None)
            .unwrap();
        assert_eq!(conn.execute_non_query("DELETE FROM t WHERE i > 1", None).unwrap(), 2);
    }

    #[test]
    fn data_persists_across_connections() {
        let (factory, _dir) = factory();
        factory
            .open()
            .unwrap()
            .execute_non_query("CREATE TABLE t (i INTEGER)", None)
            .unwrap();
        let mut conn = factory.open().unwrap();
        assert!(conn.execute_scalar("SELECT count(*) FROM t", None).is_ok());
    }

    #[test]
    fn missing_table_is_an_error() {
        let (factory, _dir) = factory();
        let mut conn = factory.open().unwrap();
        assert!(matches!(
            conn.execute_scalar("select count(*) from \"SchemaVersions\"", None),
            Err(Error::Rusqlite(_))
        ));
    }

    #[test]
    fn unopenable_path_is_a_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let factory = SqliteConnectionFactory::new(dir.path().join("missing").join("test.db"));
        assert!(matches!(factory.open(), Err(Error::Connection(_))));
    }

    #[test]
    fn timeout_is_applied_as_busy_timeout() {
        let (factory, _dir) = factory();
        let mut conn = factory.open().unwrap();
        conn.execute_non_query("CREATE TABLE a (i INTEGER)", Some(Duration::from_millis(250)))
            .unwrap();
        conn.execute_non_query("CREATE TABLE b (i INTEGER)", None).unwrap();
        assert_eq!(
            conn.execute_scalar("SELECT count(*) FROM sqlite_master", None).unwrap(),
            Some("2".to_string())
        );
    }
}
