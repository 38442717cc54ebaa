//! Command/response driver for NCD relay and ADC controller boards.
//!
//! A [`Controller`] owns an already-open duplex stream (serial line, TCP
//! socket, or anything implementing `Read + Write`). Each command builds a
//! request packet, runs one write-then-read exchange raced against a
//! caller-supplied deadline, validates the response packet and decodes a
//! typed result.
//!
//! The protocol is strictly half-duplex with no request identifiers, so a
//! controller never runs two exchanges against its stream at once.

pub mod command;
pub mod config;
pub mod controller;
pub mod error;

#[cfg(feature = "async")]
pub mod async_controller;

pub use command::{
    decode_10bit, decode_all_10bit, decode_all_8bit, decode_relay_status, Command, Response,
    ACK_RESPONSE_LEN, AD_CHANNELS,
};
pub use config::{ControllerConfig, DEFAULT_TIMEOUT};
pub use controller::Controller;
pub use error::{ControllerError, Result};

#[cfg(feature = "async")]
pub use async_controller::AsyncController;
