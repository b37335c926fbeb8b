use crate::protocol::CorrelationId;

/// Errors surfaced to control-side callers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// The render side could not bind a renderer. Fatal for the bridge.
    #[error("renderer initialization failed: {0}")]
    Initialization(String),

    /// The render side reported a failure for a correlated request.
    #[error("operation failed: {0}")]
    Operation(String),

    /// No acknowledgement arrived before the deadline. The render side may
    /// still complete the operation later.
    #[error("request {id} ({op}) timed out")]
    Timeout { id: CorrelationId, op: &'static str },

    /// The render-side unit raised an uncaught fault.
    #[error("render unit fault: {0}")]
    Transport(String),

    #[error("bridge is not ready; call initialize first")]
    NotReady,

    #[error("bridge is already initialized")]
    AlreadyInitialized,

    /// The channel closed before a response was delivered.
    #[error("render unit disconnected")]
    Disconnected,

    #[error("failed to spawn execution unit: {0}")]
    Spawn(String),

    #[error("computation failed: {0}")]
    Compute(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Wire-level decoding failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unknown message kind `{0}`")]
    UnknownKind(String),

    #[error("message kind `{0}` requires a correlation id")]
    MissingId(&'static str),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Malformed(err.to_string())
    }
}
