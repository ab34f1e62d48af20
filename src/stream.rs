//! User-facing view of a call.
//!
//! Handlers and streaming clients see a [Stream]: raw byte payloads in both
//! directions plus the two close flavors. [StreamExt] layers typed
//! serialization on top with an explicit codec, so the dyn seam stays
//! object safe.

use crate::rpc::CommonRpc;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use starpc_core::{Codec, error::RpcErr};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

/// Callback run after [Stream::close] cancels the call. The server side uses
/// it to cancel the worker; the client side tears the writer down.
pub type CloseCb = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle to an on-going bi-directional or one-directional stream call.
#[async_trait]
pub trait Stream: Send + Sync {
    /// Send one payload to the remote.
    async fn send_raw(&self, data: Vec<u8>) -> Result<(), RpcErr>;

    /// Receive the next payload from the remote, in arrival order.
    async fn recv_raw(&self) -> Result<Vec<u8>, RpcErr>;

    /// Signal to the remote that we will no longer send any messages.
    async fn close_send(&self) -> Result<(), RpcErr>;

    /// Close the stream for reading and writing.
    async fn close(&self) -> Result<(), RpcErr>;
}

pub type ArcStream = Arc<dyn Stream>;

/// Typed helpers over any [Stream].
pub trait StreamExt: Stream {
    /// Serialize `msg` with `codec` and send it as one payload.
    fn msg_send<'a, C, T>(
        &'a self, codec: &'a C, msg: &'a T,
    ) -> impl Future<Output = Result<(), RpcErr>> + Send + 'a
    where
        Self: Sync,
        C: Codec,
        T: Serialize + Sync,
    {
        async move {
            let buf = codec.encode(msg)?;
            self.send_raw(buf).await
        }
    }

    /// Receive one payload and parse it into `T`.
    fn msg_recv<'a, C, T>(&'a self, codec: &'a C) -> impl Future<Output = Result<T, RpcErr>> + Send + 'a
    where
        Self: Sync,
        C: Codec,
        T: DeserializeOwned + Send,
    {
        async move {
            let data = self.recv_raw().await?;
            codec.decode::<T>(&data)
        }
    }
}

impl<S: Stream + ?Sized> StreamExt for S {}

/// The engine's [Stream] implementation over a call's shared state.
pub struct MsgStream {
    rpc: Arc<CommonRpc>,
    close_cb: Option<CloseCb>,
}

impl MsgStream {
    pub fn new(rpc: Arc<CommonRpc>, close_cb: Option<CloseCb>) -> Self {
        Self { rpc, close_cb }
    }
}

#[async_trait]
impl Stream for MsgStream {
    async fn send_raw(&self, data: Vec<u8>) -> Result<(), RpcErr> {
        let data_is_zero = data.is_empty();
        self.rpc.write_call_data(data, data_is_zero, false, None).await
    }

    async fn recv_raw(&self) -> Result<Vec<u8>, RpcErr> {
        self.rpc.read_one().await
    }

    async fn close_send(&self) -> Result<(), RpcErr> {
        self.rpc.write_call_data(Vec::new(), false, true, None).await
    }

    async fn close(&self) -> Result<(), RpcErr> {
        // a second close finds the call completed, which is fine
        match self.rpc.write_call_cancel().await {
            Ok(()) | Err(RpcErr::Completed) => {}
            Err(e) => return Err(e),
        }
        if let Some(cb) = self.close_cb.as_ref() {
            cb().await;
        }
        Ok(())
    }
}
