use crate::error::Error;
use chrono::NaiveDateTime;
use std::collections::HashMap;

/// Variables available to `$name$` substitution during a run.
pub type Variables = HashMap<String, String>;

/// The variable name reserved for the executor's schema.
pub const SCHEMA_VARIABLE: &str = "schema";

/// A named unit of SQL text to be applied to a database exactly once.
///
/// The name is the identity of the script: it is the key stored in the journal and the
/// key that determines execution order (ascending, lexical). Renaming a script that was
/// already applied causes it to be applied again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlScript {
    name: String,
    contents: String,
}

impl SqlScript {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }
}

/// A row of the journal table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedScript {
    pub script_name: String,
    /// When the script was recorded, in UTC.
    pub applied: NaiveDateTime,
}

/// Represents a failure while applying a script.
#[derive(Debug, PartialEq)]
pub struct ScriptFailure<'script> {
    pub(crate) script: &'script SqlScript,
    pub(crate) error: Error,
}

impl<'script> ScriptFailure<'script> {
    /// Get the script that failed.
    pub fn script(&self) -> &SqlScript {
        self.script
    }

    /// Get the error that caused the script to fail.
    pub fn error(&self) -> &Error {
        &self.error
    }
}

/// A report of actions performed during a run.
#[derive(Debug, PartialEq)]
pub struct UpgradeReport<'script> {
    pub journal_table_existed: bool,
    /// Names of the scripts applied (or stamped) by this run, in execution order.
    pub scripts_run: Vec<String>,
    /// The first script that failed. No script after it was attempted.
    pub failing_script: Option<ScriptFailure<'script>>,
}

impl UpgradeReport<'_> {
    pub fn is_successful(&self) -> bool {
        self.failing_script.is_none()
    }
}
