use std::process::ExitStatus;

use thiserror::Error;

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A host command exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        /// The command line that was run.
        command: String,

        /// Its exit status.
        status: ExitStatus,

        /// Its trimmed standard error.
        stderr: String,
    },

    /// A database name that is not a plain identifier.
    #[error("invalid database name: {0:?}")]
    InvalidDatabaseName(String),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// Command output was not the expected JSON.
    #[error("{0}: {1}")]
    Json(&'static str, #[source] serde_json::Error),

    /// Command output was empty where an id was expected.
    #[error("no id in output of `{0}`")]
    MissingId(String),
}
