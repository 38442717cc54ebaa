use std::path::PathBuf;

/// Errors that can occur while opening or using a device stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the serial port.
    #[error("failed to open serial port {path}: {source}")]
    Open {
        path: PathBuf,
        source: serialport::Error,
    },

    /// Failed to connect to a TCP endpoint.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// The I/O error kind behind this failure, when there is one.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            TransportError::Open { source, .. } => match source.kind() {
                serialport::ErrorKind::Io(kind) => Some(kind),
                serialport::ErrorKind::NoDevice => Some(std::io::ErrorKind::NotFound),
                _ => None,
            },
            TransportError::Connect { source, .. } | TransportError::Io(source) => {
                Some(source.kind())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
