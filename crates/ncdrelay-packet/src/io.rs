//! Blocking (and optionally async) packet transfer over a duplex stream.
//!
//! Short writes and short reads are retried until the whole request is
//! flushed or the whole response buffer is filled. `Interrupted` is retried;
//! any other error, `WouldBlock` and timeouts included, aborts the transfer
//! immediately.

use std::io::{self, ErrorKind, Read, Write};

use tracing::trace;

use crate::codec::Packet;

/// Write the full request packet, retrying partial writes, then flush.
pub fn write_packet<W: Write + ?Sized>(stream: &mut W, packet: &Packet) -> io::Result<()> {
    let bytes = packet.as_bytes();
    let mut offset = 0usize;
    while offset < bytes.len() {
        match stream.write(&bytes[offset..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "stream accepted no bytes of the request",
                ))
            }
            Ok(n) => {
                offset += n;
                trace!(written = n, remaining = bytes.len() - offset, "partial write");
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    loop {
        match stream.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Read exactly `len` bytes and wrap them as an unvalidated response packet.
pub fn read_response<R: Read + ?Sized>(stream: &mut R, len: usize) -> io::Result<Packet> {
    let mut buf = vec![0u8; len];
    let mut filled = 0usize;
    while filled < len {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("stream closed after {filled} of {len} response bytes"),
                ))
            }
            Ok(n) => {
                filled += n;
                trace!(read = n, remaining = len - filled, "partial read");
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(Packet::from_bytes(buf))
}

/// Async counterpart of [`write_packet`].
#[cfg(feature = "async")]
pub async fn write_packet_async<W>(stream: &mut W, packet: &Packet) -> io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin + ?Sized,
{
    use tokio::io::AsyncWriteExt;

    stream.write_all(packet.as_bytes()).await?;
    stream.flush().await
}

/// Async counterpart of [`read_response`].
#[cfg(feature = "async")]
pub async fn read_response_async<R>(stream: &mut R, len: usize) -> io::Result<Packet>
where
    R: tokio::io::AsyncRead + Unpin + ?Sized,
{
    use tokio::io::AsyncReadExt;

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(Packet::from_bytes(buf))
}
