use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::error::{Result, TransportError};

/// Baud rate NCD boards ship configured for.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// An open connection to a controller board. Implements `Read + Write`.
///
/// The timeout given at open time bounds each individual read or write on
/// the underlying handle, so a board that stops answering cannot block the
/// owner forever.
pub struct DeviceStream {
    inner: DeviceStreamInner,
}

enum DeviceStreamInner {
    Serial(Box<dyn SerialPort>),
    Tcp(TcpStream),
}

impl DeviceStream {
    /// Open a serial port (8N1, no flow control).
    pub fn open_serial(path: impl AsRef<Path>, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let port = serialport::new(path.to_string_lossy(), baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|source| TransportError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(?path, baud_rate, "opened serial port");
        Ok(Self {
            inner: DeviceStreamInner::Serial(port),
        })
    }

    /// Connect to a TCP serial bridge, trying each resolved address in turn.
    pub fn connect_tcp(addr: &str, timeout: Duration) -> Result<Self> {
        let connect_err = |source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        };

        let mut last_err = None;
        for candidate in addr.to_socket_addrs().map_err(connect_err)? {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    let mut stream = Self {
                        inner: DeviceStreamInner::Tcp(stream),
                    };
                    stream.set_timeout(timeout)?;
                    debug!(%candidate, "connected to tcp bridge");
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(connect_err(last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "address resolved to no endpoints",
            )
        })))
    }

    /// Bound every subsequent read and write by `timeout`.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        match &mut self.inner {
            DeviceStreamInner::Serial(port) => port
                .set_timeout(timeout)
                .map_err(|err| TransportError::Io(err.into())),
            DeviceStreamInner::Tcp(stream) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                Ok(())
            }
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            DeviceStreamInner::Serial(_) => "serial",
            DeviceStreamInner::Tcp(_) => "tcp",
        }
    }
}

impl Read for DeviceStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DeviceStreamInner::Serial(port) => port.read(buf),
            DeviceStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for DeviceStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DeviceStreamInner::Serial(port) => port.write(buf),
            DeviceStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            DeviceStreamInner::Serial(port) => port.flush(),
            DeviceStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl std::fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            DeviceStreamInner::Serial(port) => f
                .debug_struct("DeviceStream")
                .field("type", &"serial")
                .field("name", &port.name())
                .finish(),
            DeviceStreamInner::Tcp(stream) => f
                .debug_struct("DeviceStream")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
        }
    }
}
