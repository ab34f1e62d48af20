use crate::packet::Packet;
use async_trait::async_trait;
use starpc_core::error::RpcErr;
use std::sync::Arc;

/// Sink for outbound packets of one call.
///
/// The engine may call `write_packet` from more than one task (the handler
/// worker and the inbound dispatcher echoing a terminal packet), so
/// implementations serialize writes at the sink. `close` is idempotent.
#[async_trait]
pub trait PacketWriter: Send + Sync {
    /// Serialize and push one packet onto the transport.
    async fn write_packet(&self, pkt: Packet) -> Result<(), RpcErr>;

    /// Signal end-of-write to the transport.
    async fn close(&self) -> Result<(), RpcErr>;
}

pub type ArcWriter = Arc<dyn PacketWriter>;
