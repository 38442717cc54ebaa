//! Driver for NCD ProXR-style relay and ADC controller boards.
//!
//! The board speaks a half-duplex, checksummed command/response protocol
//! over a serial line (or a TCP serial bridge). This crate re-exports the
//! pieces needed to drive one.
//!
//! # Crate Structure
//!
//! - [`packet`]: framing, checksums and response validation
//! - [`controller`]: typed commands raced against caller deadlines
//! - [`transport`]: serial port and TCP bridge streams
//!
//! ```no_run
//! use ncdrelay::controller::Controller;
//! use ncdrelay::transport::{DeviceStream, DEFAULT_BAUD_RATE};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let port = DeviceStream::open_serial("/dev/ttyUSB0", DEFAULT_BAUD_RATE, Duration::from_secs(5))?;
//! let controller = Controller::new(port)?;
//! controller.turn_on_relay(controller.deadline(), 1)?;
//! assert!(controller.relay_status(controller.deadline(), 1)?);
//! # Ok(())
//! # }
//! ```

/// Re-export packet codec types.
pub mod packet {
    pub use ncdrelay_packet::*;
}

/// Re-export controller types.
pub mod controller {
    pub use ncdrelay_controller::*;
}

/// Re-export transport types.
pub mod transport {
    pub use ncdrelay_transport::*;
}
