use thiserror::Error;

/// Everything that can go wrong outside the search itself.
///
/// The searcher proper has no recoverable failure modes: once a rule set has
/// been validated, a violated invariant (an empty move list at an ongoing
/// position, a killer index past the move list) is a bug and panics.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Loading or calling a rule module failed, or the module returned
    /// ill-formed data (bad dimensions, out-of-range piece codes or
    /// coordinates).
    #[error("script error: {0}")]
    Script(String),
    /// Malformed input on the server protocol. Fatal for the process.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Res<T> = Result<T, EngineError>;

impl EngineError {
    pub fn script(msg: impl Into<String>) -> Self {
        EngineError::Script(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        EngineError::Protocol(msg.into())
    }
}
