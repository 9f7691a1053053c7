//! One-frame-at-a-time stream framing.
//!
//! [`send_frame`] serializes and flushes a frame as a single write;
//! [`recv_frame`] reads exactly one frame (header, then payload) off a byte
//! stream. End-of-stream, clean or mid-frame, surfaces as `Ok(None)`,
//! matching the "peer went away" semantics the connection loops expect.
//!
//! Callers own write serialization: two tasks must never call [`send_frame`]
//! on the same writer concurrently. Sessions wrap their write half in a
//! mutex to hold that invariant.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::{TransportError, TransportResult};
use super::frame::{Frame, FrameError};
use crate::core::{HEADER_MAGIC, HEADER_SIZE};

/// Serialize `frame` and write it as one flushed unit.
pub async fn send_frame<W>(writer: &mut W, frame: &Frame) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.encode();
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one frame off the stream.
///
/// Returns `Ok(None)` on end-of-stream, whether it lands cleanly between
/// frames or truncates one.
///
/// # Errors
///
/// - [`TransportError::Frame`] with [`FrameError::BadMagic`] when the header
///   does not start with `hag1` (the connection is unrecoverable: framing is
///   lost)
/// - [`TransportError::FrameTooLarge`] when the header promises more than
///   `max_payload` bytes
/// - [`TransportError::Io`] for any other stream failure
pub async fn recv_frame<R>(reader: &mut R, max_payload: usize) -> TransportResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    if read_exact_or_eof(reader, &mut header).await?.is_none() {
        return Ok(None);
    }

    if header[0..4] != HEADER_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        return Err(FrameError::BadMagic(magic).into());
    }

    let mut size_bytes = [0u8; 4];
    size_bytes.copy_from_slice(&header[28..32]);
    let payload_size = u32::from_le_bytes(size_bytes) as usize;
    if payload_size > max_payload {
        return Err(TransportError::FrameTooLarge { size: payload_size, max: max_payload });
    }

    let mut buf = vec![0u8; HEADER_SIZE + payload_size];
    buf[..HEADER_SIZE].copy_from_slice(&header);
    if payload_size > 0 && read_exact_or_eof(reader, &mut buf[HEADER_SIZE..]).await?.is_none() {
        return Ok(None);
    }

    let frame = Frame::decode(&buf)?;
    Ok(Some(frame))
}

/// `read_exact` that maps end-of-stream to `None` instead of an error.
async fn read_exact_or_eof<R>(reader: &mut R, buf: &mut [u8]) -> TransportResult<Option<()>>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(Some(())),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}
