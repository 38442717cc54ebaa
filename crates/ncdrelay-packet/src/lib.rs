//! Request/response packet codec for NCD relay and ADC controllers.
//!
//! Every packet on the wire is framed as:
//! - A handshake byte (`0xAA`) marking the start of the packet
//! - A length byte counting the payload bytes
//! - The payload itself
//! - An additive checksum (sum of all preceding bytes, modulo 256)
//!
//! Validation is all-or-nothing: a packet that fails any check is never
//! partially trusted.

pub mod codec;
pub mod error;
pub mod io;

pub use codec::{
    checksum, Packet, COMMAND_PREFIX, FRAMING_OVERHEAD, HANDSHAKE, MAX_PAYLOAD,
};
pub use error::{PacketError, Result};
pub use io::{read_response, write_packet};

#[cfg(feature = "async")]
pub use io::{read_response_async, write_packet_async};
