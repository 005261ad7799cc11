// Deferred-call protocol errors

use thiserror::Error;

/// Violations of the deferred-call payload protocol
///
/// These are never retriable: the payload is written once at submission and
/// read once by the deferred process.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("no call target given (expected one of name=, object=)")]
    MissingTarget,

    #[error("call received multiple targets")]
    MultipleTargets,

    #[error("unexpected marker {0:?} alongside the call target")]
    UnexpectedMarker(String),

    #[error("marker {0:?} given more than once")]
    DuplicateMarker(String),

    #[error("malformed marker {0:?} (expected key=value)")]
    MalformedMarker(String),

    #[error("invalid callable name {0:?}")]
    InvalidName(String),

    #[error("no callable registered as {0:?}")]
    UnknownCallable(String),

    #[error("no task type registered as {0:?}")]
    UnknownTaskType(String),

    #[error("undecodable blob: {0}")]
    Encoding(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("deferred call expects <flag> <target> <arguments>, got {0} argument(s)")]
    ArgumentCount(usize),
}
