use crate::error::RpcErr;
use serde::{Deserialize, Serialize};

/// Length prefix put in front of a packet by framed transports: a 4-byte
/// little-endian body length.
pub const FRAME_PREFIX_LEN: usize = 4;

/// Serialization seam of the engine.
///
/// Control packets and user messages both go through the same codec, and a
/// failure on either path surfaces as a regular error kind (typically
/// [RpcErr::InvalidMessage](crate::error::RpcErr)) rather than a
/// codec-specific type. The codec is immutable; state such as a cipher
/// needs inner mutability.
pub trait Codec: Default + Send + Sync + Sized + 'static {
    /// Serialize one message into a fresh buffer.
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, RpcErr>;

    /// Serialize one message as a length-prefixed frame ready for a
    /// byte-stream transport. Implementations can serialize directly behind
    /// the prefix and skip the extra copy this default performs.
    fn encode_framed<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, RpcErr> {
        let body = self.encode(msg)?;
        let mut buf = Vec::with_capacity(FRAME_PREFIX_LEN + body.len());
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Parse one message out of a received buffer.
    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, RpcErr>;
}
