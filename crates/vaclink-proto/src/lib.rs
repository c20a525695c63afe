//! Wire codec for the proxy's length-prefixed JSON protocol.
//!
//! Each frame is:
//!
//! ```text
//! byte[2]  magic    = 0x16 0x16
//! byte[2]  length   big-endian unsigned, payload bytes only
//! byte[N]  payload  UTF-8 JSON object
//! ```
//!
//! [`read_frame`] tolerates a lost frame boundary: when the two header bytes
//! do not match the magic value it slides forward one byte at a time until
//! the magic reappears, so a single corrupt frame never kills the stream.

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;
use vaclink_types::BridgeError;

/// Two-byte frame marker preceding every payload.
pub const FRAME_MAGIC: [u8; 2] = [0x16, 0x16];

/// Hard payload ceiling imposed by the 16-bit length field.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Serialize `payload` and wrap it in a magic + length header.
///
/// Fails with [`BridgeError::OversizedPayload`] when the JSON encoding does
/// not fit the length field.
pub fn encode_frame<T: Serialize>(payload: &T) -> Result<Vec<u8>, BridgeError> {
    let body = serde_json::to_vec(payload)?;
    if body.len() > MAX_PAYLOAD {
        return Err(BridgeError::OversizedPayload(body.len()));
    }
    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&(body.len() as u16).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read one frame and parse its payload.
///
/// Errors split into two classes the caller must treat differently:
///
/// * [`BridgeError::MalformedFrame`] — the length-delimited payload was not
///   valid JSON. The frame boundary is still trustworthy; drop the frame and
///   keep reading.
/// * [`BridgeError::Transport`] — I/O failure, truncated read, or EOF. The
///   connection is gone.
pub async fn read_frame<R>(reader: &mut R) -> Result<Value, BridgeError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;

    // Desync recovery: discard one byte at a time until the magic reappears.
    let mut skipped = 0usize;
    while header != FRAME_MAGIC {
        header[0] = header[1];
        reader.read_exact(&mut header[1..2]).await?;
        skipped += 1;
    }
    if skipped > 0 {
        warn!(skipped, "frame boundary lost, resynchronized on magic header");
    }

    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes).await?;
    let len = u16::from_be_bytes(len_bytes) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(serde_json::from_slice(&payload)?)
}
