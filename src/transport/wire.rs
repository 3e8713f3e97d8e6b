//! Frame codec: one JSON record per frame, frames delimited by a single
//! end-of-transmission byte (0x04).

use crate::error::{ProtocolError, Result};
use crate::transport::ProtocolMsg;

/// Frame delimiter.
pub const EOT: u8 = 0x04;

/// Serialize one record into a delimited frame.
pub fn encode(msg: &ProtocolMsg) -> Result<Vec<u8>> {
    let mut frame = serde_json::to_vec(msg)
        .map_err(|e| ProtocolError::TransportClosed(e.to_string()))?;
    frame.push(EOT);
    Ok(frame)
}

/// Parse one frame body (without the trailing EOT). A frame that is not a
/// recognized single-key record is an `UnknownTag` fault: the sender speaks a
/// different protocol and the group is desynchronized.
pub fn decode(body: &[u8]) -> Result<ProtocolMsg> {
    serde_json::from_slice(body)
        .map_err(|_| ProtocolError::UnknownTag(String::from_utf8_lossy(body).into_owned()))
}
