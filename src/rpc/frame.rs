use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{FleetError, Result};

/// Upper bound on one frame body. A peer announcing more is broken or
/// hostile; the connection is dropped rather than the allocation made.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// One unit on the wire. Bodies are bincode in field-declaration order, so
/// both ends must agree on the argument and reply types of each method.
#[derive(Debug, Serialize, Deserialize)]
pub enum Frame {
    Request {
        /// `Service.Method` name resolved against the peer's registry.
        method: String,
        /// Multiplexes concurrent calls on the connection.
        seq: u64,
        body: Vec<u8>,
    },
    Response {
        seq: u64,
        result: std::result::Result<Vec<u8>, String>,
    },
}

pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Frame> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)
        .await
        .map_err(|e| FleetError::Transport(e.to_string()))?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(FleetError::Transport(format!(
            "frame of {len} bytes exceeds limit"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)
        .await
        .map_err(|e| FleetError::Transport(e.to_string()))?;
    Ok(bincode::deserialize(&buf)?)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &Frame) -> Result<()> {
    let body = bincode::serialize(frame)?;
    let len = u32::try_from(body.len())
        .map_err(|_| FleetError::Transport(format!("frame of {} bytes exceeds u32", body.len())))?;
    w.write_all(&len.to_be_bytes())
        .await
        .map_err(|e| FleetError::Transport(e.to_string()))?;
    w.write_all(&body)
        .await
        .map_err(|e| FleetError::Transport(e.to_string()))?;
    w.flush()
        .await
        .map_err(|e| FleetError::Transport(e.to_string()))?;
    Ok(())
}
