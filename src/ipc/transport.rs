//! Framing over a connected Unix stream.
//!
//! Requests are a single line terminated by `\n`. Responses run to EOF: the
//! worker shuts down its write half once the frame is written. Frame sizes
//! count the trailing newline and never exceed `max_bytes`; an oversized
//! frame is rejected, never truncated.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Result, SocketWorkerError};

/// Default upper bound for a single frame (1 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: u64 = 1_048_576;

/// Check that `payload` plus its newline fits in one frame.
pub fn check_frame_len(payload: &[u8], max_bytes: u64) -> Result<()> {
    if payload.len() as u64 + 1 > max_bytes {
        return Err(SocketWorkerError::FrameTooLarge { limit: max_bytes });
    }
    Ok(())
}

/// Write `payload` followed by a newline, then close the write half.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(payload)
        .await
        .map_err(|e| SocketWorkerError::Ipc {
            reason: format!("write failed: {}", e),
        })?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| SocketWorkerError::Ipc {
            reason: format!("write newline failed: {}", e),
        })?;
    writer.shutdown().await.map_err(|e| SocketWorkerError::Ipc {
        reason: format!("shutdown failed: {}", e),
    })?;
    Ok(())
}

/// Read one request line (up to `\n` or EOF).
///
/// Fails with `FrameTooLarge` when the line runs past `max_bytes`.
pub async fn read_request_frame<R>(reader: R, max_bytes: u64) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf_reader = BufReader::new(reader.take(max_bytes.saturating_add(1)));
    let mut frame = Vec::new();
    buf_reader
        .read_until(b'\n', &mut frame)
        .await
        .map_err(|e| SocketWorkerError::Ipc {
            reason: format!("read failed: {}", e),
        })?;
    if frame.len() as u64 > max_bytes {
        return Err(SocketWorkerError::FrameTooLarge { limit: max_bytes });
    }
    Ok(frame)
}

/// Read a response until the peer closes.
///
/// Returns `None` when the peer closed without sending anything, and
/// `FrameTooLarge` when more than `max_bytes` arrive.
pub async fn read_response_frame<R>(reader: R, max_bytes: u64) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut frame = Vec::new();
    reader
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut frame)
        .await
        .map_err(|e| SocketWorkerError::Ipc {
            reason: format!("read failed: {}", e),
        })?;
    if frame.len() as u64 > max_bytes {
        return Err(SocketWorkerError::FrameTooLarge { limit: max_bytes });
    }
    if frame.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    Ok(Some(frame))
}
