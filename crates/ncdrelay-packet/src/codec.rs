use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PacketError, Result};

/// Sentinel byte that opens every request and response.
pub const HANDSHAKE: u8 = 0xAA;

/// Handshake (1) + length (1) + checksum (1) = 3 bytes around the payload.
pub const FRAMING_OVERHEAD: usize = 3;

/// Largest payload expressible in the length byte.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// First payload byte of every controller command.
pub const COMMAND_PREFIX: u8 = 254;

/// Unsigned 8-bit wraparound sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// A framed controller packet.
///
/// Wire format:
/// ```text
/// ┌────────────┬───────────┬─────────────────┬──────────────┐
/// │ Handshake  │ Length    │ Payload         │ Checksum     │
/// │ 0xAA (1B)  │ (1B)      │ (Length bytes)  │ (1B, sum%256)│
/// └────────────┴───────────┴─────────────────┴──────────────┘
/// ```
///
/// The buffer is immutable once built. Responses are wrapped with
/// [`Packet::from_bytes`] and must pass [`Packet::validate`] before the
/// payload is trusted.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    bytes: Bytes,
}

impl Packet {
    /// Frame `payload` as a request packet.
    pub fn build(payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            });
        }

        let mut dst = BytesMut::with_capacity(payload.len() + FRAMING_OVERHEAD);
        dst.put_u8(HANDSHAKE);
        dst.put_u8(payload.len() as u8);
        dst.put_slice(payload);
        let chk = checksum(&dst);
        dst.put_u8(chk);

        Ok(Self {
            bytes: dst.freeze(),
        })
    }

    /// Wrap raw bytes received from a device. No validation is performed.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Check handshake, length and checksum, in that order.
    pub fn validate(&self) -> Result<()> {
        let bytes = self.bytes.as_ref();
        if bytes.len() < FRAMING_OVERHEAD {
            return Err(PacketError::TooShort { len: bytes.len() });
        }

        if bytes[0] != HANDSHAKE {
            return Err(PacketError::InvalidHandshake { found: bytes[0] });
        }

        let actual = bytes.len() - FRAMING_OVERHEAD;
        if usize::from(bytes[1]) != actual {
            return Err(PacketError::LengthMismatch {
                declared: bytes[1],
                actual,
            });
        }

        let (body, tail) = bytes.split_at(bytes.len() - 1);
        let expected = checksum(body);
        if tail[0] != expected {
            return Err(PacketError::ChecksumMismatch {
                expected,
                found: tail[0],
            });
        }

        Ok(())
    }

    /// True iff handshake, length and checksum are all correct.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// The bytes between the length byte and the checksum byte.
    ///
    /// Only meaningful on a validated packet. Buffers too short to carry
    /// framing yield an empty slice.
    pub fn payload(&self) -> &[u8] {
        if self.bytes.len() < FRAMING_OVERHEAD {
            return &[];
        }
        &self.bytes[2..self.bytes.len() - 1]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Packet({:02X?})", self.bytes.as_ref())
    }
}
