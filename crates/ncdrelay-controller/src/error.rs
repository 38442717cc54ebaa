use std::time::Duration;

use ncdrelay_packet::PacketError;

/// Errors surfaced by controller commands.
///
/// Every command returns either its typed result or exactly one of these.
/// Nothing is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The response failed handshake, length or checksum validation, or
    /// carried too few payload bytes to decode.
    #[error("invalid response: {0}")]
    InvalidResponse(#[source] PacketError),

    /// The deadline elapsed before the exchange completed.
    #[error("timed out waiting for response after {0:?}")]
    Timeout(Duration),

    /// The stream reported an error while writing or reading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The arguments cannot be encoded as a request. Nothing was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ControllerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_invalid_response(&self) -> bool {
        matches!(self, Self::InvalidResponse(_))
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
