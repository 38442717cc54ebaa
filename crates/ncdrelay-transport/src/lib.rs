//! Duplex byte streams for reaching a relay controller.
//!
//! The controller itself only needs `Read + Write`; this crate supplies the
//! two transports boards are usually wired to:
//! - Serial lines (USB/RS-232), 8N1 at a caller-chosen baud rate
//! - TCP sockets (network bridges)
//!
//! Device discovery and reconnection are left to the caller.

pub mod error;
pub mod stream;

pub use error::{Result, TransportError};
pub use stream::{DeviceStream, DEFAULT_BAUD_RATE};
