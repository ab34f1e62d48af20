//! Client facade: one-shot calls and streaming calls on top of a transport
//! supplied as an [OpenStream] factory.

use crate::rpc::ClientRpc;
use crate::stream::{ArcStream, CloseCb, MsgStream};
use crate::writer::ArcWriter;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use starpc_core::{Codec, error::RpcErr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Inbound dispatch callback: the transport calls it with every framed
/// packet body it reads for this stream.
pub type MsgHandler = Box<dyn Fn(Vec<u8>) -> BoxFuture<'static, Result<(), RpcErr>> + Send + Sync>;

/// Called exactly once when the transport under the stream closes, with
/// `Eof` for a clean close.
pub type CloseHandler = Box<dyn FnOnce(Option<RpcErr>) -> BoxFuture<'static, ()> + Send>;

/// Transport factory: open one stream to the remote per call.
#[async_trait]
pub trait OpenStream: Send + Sync {
    async fn open_stream(
        &self, msg_handler: MsgHandler, close_handler: CloseHandler,
    ) -> Result<ArcWriter, RpcErr>;
}

/// An rpc client that can initiate calls over an [OpenStream] transport.
pub struct Client<T: OpenStream, C: Codec> {
    opener: T,
    codec: Arc<C>,
}

impl<T: OpenStream, C: Codec> Client<T, C> {
    pub fn new(opener: T) -> Self {
        Self { opener, codec: Arc::new(C::default()) }
    }

    /// Open a stream wired to a fresh [ClientRpc] and start the call.
    async fn start_rpc(
        &self, service: &str, method: &str, write_first_msg: bool, first_msg: Vec<u8>,
    ) -> Result<ClientRpc<C>, RpcErr> {
        let rpc = ClientRpc::<C>::new(service, method);

        let h = rpc.clone();
        let msg_handler: MsgHandler = Box::new(move |data: Vec<u8>| {
            let h = h.clone();
            Box::pin(async move { h.handle_packet_data(&data).await })
        });
        let h = rpc.clone();
        let close_handler: CloseHandler = Box::new(move |close_err| {
            Box::pin(async move { h.handle_stream_close(close_err).await })
        });

        let writer = self.opener.open_stream(msg_handler, close_handler).await?;
        rpc.start(writer, write_first_msg, first_msg).await?;
        Ok(rpc)
    }

    /// Execute a unary rpc: send `req` as the first payload, return the
    /// first response payload parsed into `P`. The call is closed whatever
    /// the outcome.
    pub async fn exec_call<Q, P>(&self, service: &str, method: &str, req: &Q) -> Result<P, RpcErr>
    where
        Q: Serialize + Sync,
        P: DeserializeOwned,
    {
        let first_msg = self.codec.encode(req)?;
        let rpc = self.start_rpc(service, method, true, first_msg).await?;
        let res = self.recv_unary(&rpc).await;
        rpc.close().await;
        res
    }

    async fn recv_unary<P: DeserializeOwned>(&self, rpc: &ClientRpc<C>) -> Result<P, RpcErr> {
        let data = rpc.read_one().await?;
        self.codec.decode::<P>(&data)
    }

    /// Start a streaming rpc and hand back the stream view. `first_msg` is
    /// optional; closing the stream cancels the call and tears the writer
    /// down.
    pub async fn new_stream<Q>(
        &self, service: &str, method: &str, first_msg: Option<&Q>,
    ) -> Result<ArcStream, RpcErr>
    where
        Q: Serialize + Sync,
    {
        let (write_first_msg, first_msg) = match first_msg {
            None => (false, Vec::new()),
            Some(msg) => (true, self.codec.encode(msg)?),
        };
        let rpc = self.start_rpc(service, method, write_first_msg, first_msg).await?;

        let close_cb: CloseCb = {
            let rpc = rpc.clone();
            Box::new(move || {
                let rpc = rpc.clone();
                Box::pin(async move {
                    rpc.common().teardown().await;
                })
            })
        };
        Ok(Arc::new(MsgStream::new(rpc.common().clone(), Some(close_cb))))
    }
}

/// A round-robin set of clients sharing one transport flavor.
///
/// Calls rotate through the members; an empty set refuses with
/// `NoAvailableClients`.
pub struct ClientSet<T: OpenStream, C: Codec> {
    clients: Vec<Client<T, C>>,
    next: AtomicUsize,
}

impl<T: OpenStream, C: Codec> ClientSet<T, C> {
    pub fn new(clients: Vec<Client<T, C>>) -> Self {
        Self { clients, next: AtomicUsize::new(0) }
    }

    pub fn push(&mut self, client: Client<T, C>) {
        self.clients.push(client);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn pick(&self) -> Result<&Client<T, C>, RpcErr> {
        if self.clients.is_empty() {
            return Err(RpcErr::NoAvailableClients);
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        Ok(&self.clients[idx])
    }

    pub async fn exec_call<Q, P>(&self, service: &str, method: &str, req: &Q) -> Result<P, RpcErr>
    where
        Q: Serialize + Sync,
        P: DeserializeOwned,
    {
        self.pick()?.exec_call(service, method, req).await
    }

    pub async fn new_stream<Q>(
        &self, service: &str, method: &str, first_msg: Option<&Q>,
    ) -> Result<ArcStream, RpcErr>
    where
        Q: Serialize + Sync,
    {
        self.pick()?.new_stream(service, method, first_msg).await
    }
}
