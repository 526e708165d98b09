//! The log sink the engine reports progress to.

/// Receives human-readable progress and failure messages from a run.
///
/// The engine decides *when* to write (start of a script, failures, journal table creation);
/// implementations decide where the lines go.
pub trait UpgradeLog {
    fn write_information(&self, message: &str);
    fn write_error(&self, message: &str);
}

/// Forwards messages to [`tracing`] under the `sqlup` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl UpgradeLog for TracingLog {
    fn write_information(&self, message: &str) {
        tracing::info!(target: "sqlup", "{}", message);
    }

    fn write_error(&self, message: &str) {
        tracing::error!(target: "sqlup", "{}", message);
    }
}
