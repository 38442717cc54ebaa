//! Request encoding and response decoding for the controller command set.
//!
//! Every request payload starts with [`COMMAND_PREFIX`] followed by a
//! device sub-command byte. Offsets such as `107 + index` are device
//! constants and are reproduced byte-for-byte without range checks.

use ncdrelay_packet::{Packet, PacketError, COMMAND_PREFIX, FRAMING_OVERHEAD};

use crate::config::ControllerConfig;
use crate::error::{ControllerError, Result};

pub const RELAY_ON: u8 = 48;
pub const RELAY_OFF: u8 = 47;
pub const RELAY_STATUS: u8 = 44;
pub const SET_BANK_STATUS: u8 = 140;
pub const BANK_STATUS: u8 = 124;
pub const BANK_RELAY_ON_BASE: u8 = 107;
pub const BANK_RELAY_OFF_BASE: u8 = 99;
pub const READ_AD_BASE: u8 = 149;
pub const READ_ALL_AD: u8 = 166;

/// Total length of an acknowledgement: 3 framing bytes + 1 ack byte.
pub const ACK_RESPONSE_LEN: usize = FRAMING_OVERHEAD + 1;

/// Number of ADC channels returned by the read-all commands.
pub const AD_CHANNELS: usize = 8;

/// What a command expects back from the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// A fixed 4-byte acknowledgement; no payload is returned.
    Ack,
    /// A response carrying this many payload bytes.
    Read(usize),
}

impl Response {
    /// Total bytes to read from the stream, framing included.
    pub fn wire_len(self) -> usize {
        match self {
            Response::Ack => ACK_RESPONSE_LEN,
            Response::Read(n) => n + FRAMING_OVERHEAD,
        }
    }
}

/// One controller command with its arguments.
///
/// Relay indices are 1-based. Bank relay indices and ADC channels are
/// passed through to the device offsets unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RelayOn(u16),
    RelayOff(u16),
    RelayStatus(u16),
    SetBankStatus { bank: u8, status: u8 },
    BankStatus(u8),
    BankRelayOn { bank: u8, index: u8 },
    BankRelayOff { bank: u8, index: u8 },
    ReadAd8(u8),
    ReadAllAd8,
    ReadAd10(u8),
    ReadAllAd10,
}

impl Command {
    /// Request payload bytes (without framing).
    pub fn payload(&self) -> Result<Vec<u8>> {
        let payload = match *self {
            Command::RelayOn(relay) => relay_payload(RELAY_ON, relay)?,
            Command::RelayOff(relay) => relay_payload(RELAY_OFF, relay)?,
            Command::RelayStatus(relay) => relay_payload(RELAY_STATUS, relay)?,
            Command::SetBankStatus { bank, status } => {
                vec![COMMAND_PREFIX, SET_BANK_STATUS, status, bank]
            }
            Command::BankStatus(bank) => vec![COMMAND_PREFIX, BANK_STATUS, bank],
            Command::BankRelayOn { bank, index } => vec![
                COMMAND_PREFIX,
                RELAY_ON,
                BANK_RELAY_ON_BASE.wrapping_add(index),
                bank,
            ],
            Command::BankRelayOff { bank, index } => {
                vec![COMMAND_PREFIX, BANK_RELAY_OFF_BASE.wrapping_add(index), bank]
            }
            Command::ReadAd8(channel) | Command::ReadAd10(channel) => {
                vec![COMMAND_PREFIX, READ_AD_BASE.wrapping_add(channel)]
            }
            Command::ReadAllAd8 | Command::ReadAllAd10 => vec![COMMAND_PREFIX, READ_ALL_AD],
        };
        Ok(payload)
    }

    /// Framed request packet.
    pub fn packet(&self) -> Result<Packet> {
        let payload = self.payload()?;
        Packet::build(&payload).map_err(|err| ControllerError::InvalidRequest(err.to_string()))
    }

    /// Expected response shape.
    pub fn response(&self, config: &ControllerConfig) -> Response {
        match self {
            Command::RelayOn(_)
            | Command::RelayOff(_)
            | Command::SetBankStatus { .. }
            | Command::BankRelayOn { .. }
            | Command::BankRelayOff { .. } => Response::Ack,
            Command::RelayStatus(_) | Command::BankStatus(_) | Command::ReadAd8(_) => {
                Response::Read(1)
            }
            Command::ReadAllAd8 => Response::Read(AD_CHANNELS),
            Command::ReadAd10(_) => Response::Read(config.ad10_single_payload_len),
            Command::ReadAllAd10 => Response::Read(AD_CHANNELS * 2),
        }
    }

    /// Short name for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Command::RelayOn(_) => "relay-on",
            Command::RelayOff(_) => "relay-off",
            Command::RelayStatus(_) => "relay-status",
            Command::SetBankStatus { .. } => "set-bank-status",
            Command::BankStatus(_) => "bank-status",
            Command::BankRelayOn { .. } => "bank-relay-on",
            Command::BankRelayOff { .. } => "bank-relay-off",
            Command::ReadAd8(_) => "read-ad8",
            Command::ReadAllAd8 => "read-all-ad8",
            Command::ReadAd10(_) => "read-ad10",
            Command::ReadAllAd10 => "read-all-ad10",
        }
    }
}

// Relays go on the wire as (index - 1), low byte first.
fn relay_payload(sub_command: u8, relay: u16) -> Result<Vec<u8>> {
    let Some(zero_based) = relay.checked_sub(1) else {
        return Err(ControllerError::InvalidRequest(
            "relay indices start at 1".to_string(),
        ));
    };
    let [lsb, msb] = zero_based.to_le_bytes();
    Ok(vec![COMMAND_PREFIX, sub_command, lsb, msb])
}

/// A relay is on iff the status byte is exactly 1.
pub fn decode_relay_status(payload: &[u8]) -> std::result::Result<bool, PacketError> {
    let byte = first_byte(payload)?;
    Ok(byte == 1)
}

/// The single status or sample byte of a 1-byte read.
pub fn first_byte(payload: &[u8]) -> std::result::Result<u8, PacketError> {
    payload.first().copied().ok_or(PacketError::PayloadTooShort {
        needed: 1,
        actual: 0,
    })
}

/// Combine a byte pair into a 10-bit sample.
///
/// Only the low 2 bits of the first byte contribute (as bits 8-9); the
/// second byte supplies bits 0-7.
pub fn decode_10bit(pair: &[u8]) -> std::result::Result<u16, PacketError> {
    match pair {
        [high, low, ..] => Ok((u16::from(*high & 0x03) << 8) | u16::from(*low)),
        _ => Err(PacketError::PayloadTooShort {
            needed: 2,
            actual: pair.len(),
        }),
    }
}

/// Eight 8-bit samples, channel order as sent by the board.
pub fn decode_all_8bit(payload: &[u8]) -> std::result::Result<[u8; AD_CHANNELS], PacketError> {
    payload
        .get(..AD_CHANNELS)
        .and_then(|s| <[u8; AD_CHANNELS]>::try_from(s).ok())
        .ok_or(PacketError::PayloadTooShort {
            needed: AD_CHANNELS,
            actual: payload.len(),
        })
}

/// Eight 10-bit samples; channel `i` comes from bytes `(2i, 2i + 1)`.
pub fn decode_all_10bit(payload: &[u8]) -> std::result::Result<[u16; AD_CHANNELS], PacketError> {
    if payload.len() < AD_CHANNELS * 2 {
        return Err(PacketError::PayloadTooShort {
            needed: AD_CHANNELS * 2,
            actual: payload.len(),
        });
    }

    let mut samples = [0u16; AD_CHANNELS];
    for (sample, pair) in samples.iter_mut().zip(payload.chunks_exact(2)) {
        *sample = decode_10bit(pair)?;
    }
    Ok(samples)
}
