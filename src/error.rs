//! Crate-wide error taxonomy for the fast path and the control plane.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("malformed frame")]
    Malformed,

    #[error("unsupported protocol")]
    Unsupported,

    #[error("rate limited")]
    RateLimited,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("no transmit buffer available")]
    NoBuffer,

    #[error("no transmit device attached")]
    NoDevice,

    #[error("transmit failed")]
    TransmitFailed,

    #[error("segment does not match a tracked connection")]
    UntrackedSegment,
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<crate::parser::ParseError> for EngineError {
    fn from(err: crate::parser::ParseError) -> Self {
        if err.is_unsupported() {
            EngineError::Unsupported
        } else {
            EngineError::Malformed
        }
    }
}
