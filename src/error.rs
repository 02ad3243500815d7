//! Error types for the signaling server

/// Result type alias using the signaling Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during signaling operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter (e.g. empty ICE server list)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Engine observer registered more than once
    #[error("Handler already registered: {0}")]
    HandlerAlreadyRegistered(String),

    /// Malformed envelope, SDP or candidate payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Remote answer applied a second time
    #[error("Duplicate answer: {0}")]
    DuplicateAnswer(String),

    /// Engine rejected a single remote ICE candidate
    #[error("Candidate rejected: {0}")]
    CandidateRejected(String),

    /// Operation not valid in the session's current state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Session not found in the registry
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session identifier already present in the registry
    #[error("Session already exists: {0}")]
    DuplicateSession(String),

    /// Engine-reported failure during offer/answer negotiation
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// Engine operation error outside of a negotiation step
    #[error("Engine error: {0}")]
    EngineError(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization/deserialization error on the wire envelope
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error moved (or should move) its session to `Failed`
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Error::NegotiationFailed(_) | Error::EngineError(_))
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error is recoverable for the session that caused it
    ///
    /// Recoverable errors are reported to the peer or logged without a state
    /// change; the session keeps negotiating.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Parse(_)
                | Error::DuplicateAnswer(_)
                | Error::CandidateRejected(_)
                | Error::SessionNotFound(_)
        )
    }
}
