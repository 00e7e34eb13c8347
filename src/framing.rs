//! Length-delimited framing for routing messages.
//!
//! Each frame is a little-endian `u32` length followed by that many bytes of
//! JSON. Readers refuse frames above a configured size so a faulty or hostile
//! relay cannot make us allocate without bound.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::RoutingMessage;

/// Default upper bound on a single frame (4 MiB).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("stream i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("message encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("message decoding failed: {0}")]
    Decode(#[source] serde_json::Error),
}

pub async fn write_frame<W>(stream: &mut W, data: &[u8], max_size: usize) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > max_size || data.len() > u32::MAX as usize {
        return Err(FrameError::TooLarge {
            size: data.len(),
            max: max_size,
        });
    }
    stream.write_u32_le(data.len() as u32).await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one frame. Returns `Ok(None)` if the peer closed the stream before
/// sending a length prefix.
pub async fn read_frame<R>(stream: &mut R, max_size: usize) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = match stream.read_u32_le().await {
        Ok(v) => v as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    if len > max_size {
        return Err(FrameError::TooLarge {
            size: len,
            max: max_size,
        });
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

pub async fn write_message<W>(
    stream: &mut W,
    msg: &RoutingMessage,
    max_size: usize,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = serde_json::to_vec(msg).map_err(FrameError::Encode)?;
    write_frame(stream, &bytes, max_size).await
}

/// Read one framed message.
///
/// A missing frame and a zero-length frame both yield `Ok(None)`: the relay
/// did not answer.
pub async fn read_message<R>(
    stream: &mut R,
    max_size: usize,
) -> Result<Option<RoutingMessage>, FrameError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(stream, max_size).await? {
        Some(bytes) if !bytes.is_empty() => {
            let msg = serde_json::from_slice(&bytes).map_err(FrameError::Decode)?;
            Ok(Some(msg))
        }
        _ => Ok(None),
    }
}
