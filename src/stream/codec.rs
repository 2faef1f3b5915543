//! Frame wire codec
//!
//! A sending peer opens with a 4-byte ASCII role token, then writes frames
//! back to back:
//!
//! ```text
//! "SEND" | len:i32 BE | payload[len] | len:i32 BE | payload[len] | ...
//! ```
//!
//! Nothing is ever read back on the sending side.

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Role token announcing a frame sender
pub const HANDSHAKE_TOKEN: &[u8; 4] = b"SEND";

/// Size of the length prefix
pub const HEADER_LEN: usize = 4;

/// Largest payload the length prefix can describe
pub const MAX_FRAME_LEN: usize = i32::MAX as usize;

/// Encode the length prefix for a payload of `len` bytes
pub fn encode_header(len: usize) -> io::Result<[u8; HEADER_LEN]> {
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Frame too large",
        ));
    }
    Ok((len as i32).to_be_bytes())
}

/// Write the role token and flush
pub async fn write_handshake<W: AsyncWrite + Unpin>(writer: &mut W) -> io::Result<()> {
    writer.write_all(HANDSHAKE_TOKEN).await?;
    writer.flush().await?;
    Ok(())
}

/// Write one length-prefixed frame and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    let header = encode_header(data.len())?;
    writer.write_all(&header).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the 4-byte role token a peer opens with
pub async fn read_role<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<[u8; 4]> {
    let mut role = [0u8; 4];
    reader.read_exact(&mut role).await?;
    Ok(role)
}

/// Read a single length-prefixed frame
///
/// Negative lengths and lengths above `max_len` are rejected before any
/// payload is buffered.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> io::Result<BytesMut> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let len = i32::from_be_bytes(header);

    if len < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Negative frame length {}", len),
        ));
    }
    let len = len as usize;
    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame of {} bytes exceeds limit of {}", len, max_len),
        ));
    }

    let mut buf = BytesMut::with_capacity(len);
    buf.resize(len, 0);
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}
