// Central Error Type for the bridge

use thiserror::Error;

/// Bridge-level error type
///
/// Every failure talking to the daemon ends up here; only the empty results
/// that an operation explicitly defines (missing script, nothing cancelled)
/// are reported as `Ok`.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The program could not be started, or died before producing an exit code
    #[error("Invocation error: {0}")]
    Invoke(#[from] crate::port::InvokeError),

    #[error("process {program} {}: {}", describe_exit(.exit_code), .stderr.trim_end())]
    ProcessExit {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Unrecognized line from at: {line:?}")]
    Parse { line: String },

    #[error("Submission didn't return a job identifier (stderr: {stderr:?})")]
    MissingAcknowledgment { stderr: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] crate::domain::ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("returned {}", code),
        None => "was terminated by a signal".to_string(),
    }
}
