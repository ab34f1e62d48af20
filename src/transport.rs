//! Transport glue that lives with the engine: a channel-backed packet writer
//! shared by the concrete transports, and an in-memory pipe transport that
//! wires a client directly to a server invoker. The pipe carries encoded
//! packet frames end to end, so it exercises the same parse path as a real
//! socket.

use crate::client::{CloseHandler, MsgHandler, OpenStream};
use crate::mux::ArcInvoker;
use crate::packet::Packet;
use crate::rpc::ServerRpc;
use crate::writer::{ArcWriter, PacketWriter};
use async_trait::async_trait;
use crossfire::{MAsyncRx, MTx, mpmc};
use starpc_core::{Codec, error::RpcErr, runtime::AsyncRT};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

/// A PacketWriter that serializes packets and pushes them into an unbounded
/// channel, either as bare encoded bodies (the in-process pipe) or as
/// length-prefixed frames via [Codec::encode_framed] (byte-stream
/// transports). Dropping the sender is the close signal, which makes close
/// idempotent and never blocks a writer behind a slow peer.
pub struct ChannelWriter<C: Codec> {
    tx: Mutex<Option<MTx<Vec<u8>>>>,
    codec: Arc<C>,
    framed: bool,
}

impl<C: Codec> ChannelWriter<C> {
    pub fn new(tx: MTx<Vec<u8>>, codec: Arc<C>) -> Self {
        Self { tx: Mutex::new(Some(tx)), codec, framed: false }
    }

    /// A writer whose channel carries ready-to-send length-prefixed frames.
    pub fn new_framed(tx: MTx<Vec<u8>>, codec: Arc<C>) -> Self {
        Self { tx: Mutex::new(Some(tx)), codec, framed: true }
    }
}

#[async_trait]
impl<C: Codec> PacketWriter for ChannelWriter<C> {
    async fn write_packet(&self, pkt: Packet) -> Result<(), RpcErr> {
        let frame = if self.framed {
            self.codec.encode_framed(&pkt)?
        } else {
            self.codec.encode(&pkt)?
        };
        let tx = self.tx.lock().unwrap();
        match tx.as_ref() {
            None => Err(RpcErr::Eof),
            Some(tx) => {
                if tx.send(frame).is_err() {
                    return Err(RpcErr::Eof);
                }
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), RpcErr> {
        self.tx.lock().unwrap().take();
        Ok(())
    }
}

/// In-memory transport: every opened stream is served by a fresh
/// [ServerRpc] against the shared invoker, with both directions pumped by
/// detached tasks.
pub struct PipeTransport<R: AsyncRT, C: Codec> {
    invoker: ArcInvoker,
    codec: Arc<C>,
    _rt: PhantomData<R>,
}

impl<R: AsyncRT, C: Codec> PipeTransport<R, C> {
    pub fn new(invoker: ArcInvoker) -> Self {
        Self { invoker, codec: Arc::new(C::default()), _rt: PhantomData }
    }
}

#[async_trait]
impl<R: AsyncRT, C: Codec> OpenStream for PipeTransport<R, C> {
    async fn open_stream(
        &self, msg_handler: MsgHandler, close_handler: CloseHandler,
    ) -> Result<ArcWriter, RpcErr> {
        let (c2s_tx, c2s_rx) = mpmc::unbounded_async::<Vec<u8>>();
        let (s2c_tx, s2c_rx) = mpmc::unbounded_async::<Vec<u8>>();

        let server_writer: ArcWriter = Arc::new(ChannelWriter::new(s2c_tx, self.codec.clone()));
        let server_rpc = ServerRpc::<R, C>::new(self.invoker.clone(), server_writer);
        R::spawn_detach(serve_pump(server_rpc, c2s_rx));
        R::spawn_detach(client_pump(s2c_rx, msg_handler, close_handler));

        Ok(Arc::new(ChannelWriter::new(c2s_tx, self.codec.clone())))
    }
}

/// Feed client frames into the server-side call state.
async fn serve_pump<R: AsyncRT, C: Codec>(server_rpc: ServerRpc<R, C>, rx: MAsyncRx<Vec<u8>>) {
    loop {
        match rx.recv().await {
            Err(_) => {
                server_rpc.handle_stream_close(Some(RpcErr::Eof)).await;
                return;
            }
            Ok(frame) => match server_rpc.handle_packet_data(&frame).await {
                Ok(()) => {}
                // a malformed packet ends the stream; call-state errors like
                // a duplicate completion leave the call as it was
                Err(e) if e.is_protocol() => {
                    warn!("pipe server packet err: {}", e);
                    server_rpc.handle_stream_close(Some(e)).await;
                    return;
                }
                Err(_) => {}
            },
        }
    }
}

/// Feed server frames back into the client-side packet handler.
async fn client_pump(rx: MAsyncRx<Vec<u8>>, msg_handler: MsgHandler, close_handler: CloseHandler) {
    loop {
        match rx.recv().await {
            Err(_) => {
                close_handler(Some(RpcErr::Eof)).await;
                return;
            }
            Ok(frame) => {
                if let Err(e) = msg_handler(frame).await {
                    if e.is_protocol() {
                        warn!("pipe client packet err: {}", e);
                        close_handler(Some(e)).await;
                        return;
                    }
                }
            }
        }
    }
}
