//! Nested rpc tunneling: carry the packets of inner calls inside the
//! payloads of an outer bidi call, addressed by an opaque component id.
//!
//! The initiator sends an Init envelope naming the component, the remote
//! resolves an invoker for it and answers with an Ack, and from then on
//! every Data envelope carries one serialized inner [Packet] in either
//! direction.

use crate::client::{Client, CloseHandler, MsgHandler, OpenStream};
use crate::mux::ArcInvoker;
use crate::packet::Packet;
use crate::rpc::ServerRpc;
use crate::stream::{ArcStream, Stream, StreamExt};
use crate::writer::{ArcWriter, PacketWriter};
use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};
use starpc_core::{Codec, error::RpcErr, runtime::AsyncRT};
use std::marker::PhantomData;
use std::sync::Arc;

/// Envelope for one frame of the tunneled session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcStreamPacket {
    /// Opens the tunnel toward a component.
    Init { component_id: String },
    /// Handshake reply; an empty error string means success.
    Ack { error: String },
    /// One serialized inner control packet.
    Data(Vec<u8>),
}

/// Release callback returned by a getter; run when the tunnel ends.
pub type Release = Box<dyn FnOnce() + Send>;

/// Resolves the invoker serving a component id on the accepting side.
/// `Ok((None, _))` means the component is unknown.
#[async_trait]
pub trait RpcStreamGetter: Send + Sync {
    async fn lookup(&self, component_id: &str)
        -> Result<(Option<ArcInvoker>, Option<Release>), RpcErr>;
}

/// Opens the outer bidi call that the tunnel runs over.
#[async_trait]
pub trait RpcStreamCaller: Send + Sync {
    async fn call_rpc_stream(&self) -> Result<ArcStream, RpcErr>;
}

/// PacketWriter wrapping inner packets into Data envelopes of the outer
/// stream. Closing it half-closes the outer call.
pub struct RpcStreamWriter<C: Codec> {
    strm: ArcStream,
    codec: Arc<C>,
}

impl<C: Codec> RpcStreamWriter<C> {
    pub fn new(strm: ArcStream, codec: Arc<C>) -> Self {
        Self { strm, codec }
    }
}

#[async_trait]
impl<C: Codec> PacketWriter for RpcStreamWriter<C> {
    async fn write_packet(&self, pkt: Packet) -> Result<(), RpcErr> {
        let inner = self.codec.encode(&pkt)?;
        self.strm.msg_send(&*self.codec, &RpcStreamPacket::Data(inner)).await
    }

    async fn close(&self) -> Result<(), RpcErr> {
        match self.strm.close_send().await {
            // close is idempotent; the call may already be complete
            Ok(()) | Err(RpcErr::Completed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Perform the initiator half of the tunnel handshake on `strm`.
///
/// With `wait_ack`, a non-empty Ack error maps to `Unimplemented`.
pub async fn open_rpc_stream<C: Codec>(
    strm: &ArcStream, codec: &C, component_id: &str, wait_ack: bool,
) -> Result<(), RpcErr> {
    strm.msg_send(codec, &RpcStreamPacket::Init { component_id: component_id.to_string() })
        .await?;

    if wait_ack {
        match strm.msg_recv::<C, RpcStreamPacket>(codec).await? {
            RpcStreamPacket::Ack { error } => {
                if !error.is_empty() {
                    warn!("rpc stream component {:?} refused: {}", component_id, error);
                    return Err(RpcErr::Unimplemented);
                }
            }
            _ => return Err(RpcErr::InvalidMessage),
        }
    }
    Ok(())
}

/// Runs a release callback when dropped, so every exit path of the tunnel
/// loop releases the component.
struct ReleaseOnDrop(Option<Release>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

/// Serve the accepting half of a tunnel on `strm` (the remote initiated it).
///
/// Resolves the component with `getter`, acks, then feeds every inbound Data
/// envelope to a nested [ServerRpc] whose outbound packets flow back as Data
/// envelopes. Returns after the outer stream reaches end of stream.
pub async fn handle_rpc_stream<R: AsyncRT, C: Codec>(
    strm: ArcStream, getter: &dyn RpcStreamGetter,
) -> Result<(), RpcErr> {
    let codec = Arc::new(C::default());

    let component_id = match strm.msg_recv::<C, RpcStreamPacket>(&codec).await? {
        RpcStreamPacket::Init { component_id } => component_id,
        _ => return Err(RpcErr::InvalidMessage),
    };
    debug!("rpc stream init for component {:?}", component_id);

    let (invoker, release) = match getter.lookup(&component_id).await {
        Err(e) => {
            let _ = strm.msg_send(&*codec, &RpcStreamPacket::Ack { error: e.to_string() }).await;
            return Err(e);
        }
        Ok((None, release)) => {
            let _release = ReleaseOnDrop(release);
            let _ = strm
                .msg_send(&*codec, &RpcStreamPacket::Ack { error: "component not found".to_string() })
                .await;
            return Err(RpcErr::Unimplemented);
        }
        Ok((Some(invoker), release)) => (invoker, release),
    };
    let _release = ReleaseOnDrop(release);

    strm.msg_send(&*codec, &RpcStreamPacket::Ack { error: String::new() }).await?;

    let writer: ArcWriter = Arc::new(RpcStreamWriter::new(strm.clone(), codec.clone()));
    let server_rpc = ServerRpc::<R, C>::new(invoker, writer);

    loop {
        match strm.msg_recv::<C, RpcStreamPacket>(&codec).await {
            Err(RpcErr::Eof) => break,
            Err(e) => return Err(e),
            Ok(RpcStreamPacket::Data(data)) => {
                match server_rpc.handle_packet_data(&data).await {
                    Ok(()) => {}
                    // malformed tunnel payloads end the session; call-state
                    // errors leave the nested call as it was
                    Err(e) if e.is_protocol() => return Err(e),
                    Err(_) => {}
                }
            }
            // stray handshake envelopes are dropped
            Ok(_) => {}
        }
    }

    // seal the nested call's read side and let an in-flight worker finish
    // writing its terminal packet before the outer call returns
    if server_rpc.started() {
        server_rpc.handle_stream_close(Some(RpcErr::Eof)).await;
        server_rpc.wait().await;
    }
    Ok(())
}

/// OpenStream implementation running the handshake on a freshly opened outer
/// stream and pumping inbound Data envelopes to the packet handler.
pub struct RpcStreamOpener<R: AsyncRT, C: Codec> {
    caller: Arc<dyn RpcStreamCaller>,
    component_id: String,
    wait_ack: bool,
    codec: Arc<C>,
    _rt: PhantomData<R>,
}

impl<R: AsyncRT, C: Codec> RpcStreamOpener<R, C> {
    pub fn new(caller: Arc<dyn RpcStreamCaller>, component_id: &str, wait_ack: bool) -> Self {
        Self {
            caller,
            component_id: component_id.to_string(),
            wait_ack,
            codec: Arc::new(C::default()),
            _rt: PhantomData,
        }
    }
}

#[async_trait]
impl<R: AsyncRT, C: Codec> OpenStream for RpcStreamOpener<R, C> {
    async fn open_stream(
        &self, msg_handler: MsgHandler, close_handler: CloseHandler,
    ) -> Result<ArcWriter, RpcErr> {
        let strm = self.caller.call_rpc_stream().await?;

        if let Err(e) = open_rpc_stream(&strm, &*self.codec, &self.component_id, self.wait_ack).await
        {
            let _ = strm.close().await;
            return Err(e);
        }

        let pump_strm = strm.clone();
        let pump_codec = self.codec.clone();
        R::spawn_detach(async move {
            read_pump::<C>(pump_strm, pump_codec, msg_handler, close_handler).await;
        });

        Ok(Arc::new(RpcStreamWriter::new(strm, self.codec.clone())))
    }
}

/// Extract inner packet bytes from inbound Data envelopes and feed them to
/// the packet handler; envelopes outside the handshake are discarded.
async fn read_pump<C: Codec>(
    strm: ArcStream, codec: Arc<C>, msg_handler: MsgHandler, close_handler: CloseHandler,
) {
    loop {
        match strm.msg_recv::<C, RpcStreamPacket>(&codec).await {
            Ok(RpcStreamPacket::Data(data)) => {
                if let Err(e) = msg_handler(data).await {
                    if e.is_protocol() {
                        warn!("rpc stream inbound packet err: {}", e);
                        close_handler(Some(e)).await;
                        return;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                close_handler(Some(e)).await;
                return;
            }
        }
    }
}

/// Construct a [Client] whose calls run through a tunnel toward
/// `component_id`, opening one outer stream per call.
pub fn new_rpc_stream_client<R: AsyncRT, C: Codec>(
    caller: Arc<dyn RpcStreamCaller>, component_id: &str, wait_ack: bool,
) -> Client<RpcStreamOpener<R, C>, C> {
    Client::new(RpcStreamOpener::new(caller, component_id, wait_ack))
}
