/// Error type for the sqlup crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(feature = "sqlite")]
    #[error("{0}")]
    Rusqlite(rusqlite::Error),
    #[cfg(feature = "mysql")]
    #[error("{0}")]
    Mysql(String),
    #[cfg(feature = "postgres")]
    #[error("{0}")]
    Postgres(#[from] postgres::Error),
    /// A connection to the target database could not be opened or used.
    #[error("connection failed: {0}")]
    Connection(String),
    /// A statement was rejected by the database.
    #[error("{0}")]
    Database(String),
    #[error("invalid object name '{name}': {reason}")]
    InvalidObjectName { name: String, reason: String },
    #[error("preprocessing failed: {0}")]
    Preprocess(String),
    /// A statement of a script failed. `statement_index` is zero-based.
    #[error("script '{script}' failed at statement {statement_index}: {source}")]
    Script {
        script: String,
        statement_index: usize,
        #[source]
        source: Box<Error>,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// The zero-based index of the failing statement, when this error came from script execution.
    pub fn statement_index(&self) -> Option<usize> {
        match self {
            Self::Script {
                statement_index, ..
            } => Some(*statement_index),
            _ => None,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Rusqlite(value)
    }
}

#[cfg(feature = "mysql")]
impl From<mysql::Error> for Error {
    fn from(value: mysql::Error) -> Self {
        Self::Mysql(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Self::Generic(value)
    }
}

// Manual PartialEq implementation because postgres::Error doesn't implement PartialEq
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            #[cfg(feature = "sqlite")]
            (Self::Rusqlite(a), Self::Rusqlite(b)) => a == b,
            #[cfg(feature = "mysql")]
            (Self::Mysql(a), Self::Mysql(b)) => a == b,
            #[cfg(feature = "postgres")]
            (Self::Postgres(a), Self::Postgres(b)) => a.to_string() == b.to_string(),
            (Self::Connection(a), Self::Connection(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a == b,
            (
                Self::InvalidObjectName { name: a, reason: x },
                Self::InvalidObjectName { name: b, reason: y },
            ) => a == b && x == y,
            (Self::Preprocess(a), Self::Preprocess(b)) => a == b,
            (
                Self::Script {
                    script: a,
                    statement_index: i,
                    source: x,
                },
                Self::Script {
                    script: b,
                    statement_index: j,
                    source: y,
                },
            ) => a == b && i == j && x == y,
            (Self::Config(a), Self::Config(b)) => a == b,
            (Self::Generic(a), Self::Generic(b)) => a == b,
            _ => false,
        }
    }
}
