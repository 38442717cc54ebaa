/// Errors that can occur while building or validating packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// The payload does not fit in the single length byte.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The buffer cannot hold the handshake, length and checksum bytes.
    #[error("packet too short ({len} bytes, need at least 3)")]
    TooShort { len: usize },

    /// The first byte is not the handshake sentinel.
    #[error("invalid handshake byte {found:#04x} (expected 0xaa)")]
    InvalidHandshake { found: u8 },

    /// The length byte disagrees with the number of payload bytes.
    #[error("length byte declares {declared} payload bytes, packet carries {actual}")]
    LengthMismatch { declared: u8, actual: usize },

    /// The trailing byte is not the sum of the bytes before it.
    #[error("checksum mismatch (expected {expected:#04x}, found {found:#04x})")]
    ChecksumMismatch { expected: u8, found: u8 },

    /// A valid packet carries fewer payload bytes than the decoder needs.
    #[error("payload too short ({actual} bytes, decoder needs {needed})")]
    PayloadTooShort { needed: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, PacketError>;
