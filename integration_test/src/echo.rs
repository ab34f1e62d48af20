//! The echo service used by every end-to-end scenario.

use crate::Codec;
use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};
use starpc::rpcstream::{Release, RpcStreamGetter, handle_rpc_stream};
use starpc::{ArcInvoker, ArcStream, Handler, Invoker, Mux, RpcErr, StreamExt};
use starpc_core::runtime::AsyncRT;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_BODY: &str = "hello world via starpc e2e test";

pub const ECHO_SERVICE: &str = "echo.Echoer";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EchoMsg {
    pub body: String,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Empty {}

/// Serves the Echoer methods; `rpc_stream_mux` backs the RpcStream tunnel
/// method when present.
pub struct EchoServer<R: AsyncRT> {
    rpc_stream_mux: Option<Arc<Mux>>,
    _rt: PhantomData<R>,
}

impl<R: AsyncRT> EchoServer<R> {
    pub fn new(rpc_stream_mux: Option<Arc<Mux>>) -> Self {
        Self { rpc_stream_mux, _rt: PhantomData }
    }
}

struct MuxGetter {
    mux: Option<Arc<Mux>>,
}

#[async_trait]
impl RpcStreamGetter for MuxGetter {
    async fn lookup(
        &self, _component_id: &str,
    ) -> Result<(Option<ArcInvoker>, Option<Release>), RpcErr> {
        Ok((self.mux.clone().map(|m| m as ArcInvoker), None))
    }
}

#[async_trait]
impl<R: AsyncRT> Invoker for EchoServer<R> {
    async fn invoke_method(
        &self, service_id: &str, method_id: &str, strm: ArcStream,
    ) -> Result<bool, RpcErr> {
        if !service_id.is_empty() && service_id != ECHO_SERVICE {
            return Ok(false);
        }
        let codec = Codec::default();
        match method_id {
            "Echo" => {
                let msg: EchoMsg = strm.msg_recv(&codec).await?;
                strm.msg_send(&codec, &msg).await?;
                Ok(true)
            }
            "EchoServerStream" => {
                let msg: EchoMsg = strm.msg_recv(&codec).await?;
                for _ in 0..5 {
                    strm.msg_send(&codec, &msg).await?;
                    R::sleep(Duration::from_millis(10)).await;
                }
                Ok(true)
            }
            "EchoClientStream" => {
                let msg: EchoMsg = strm.msg_recv(&codec).await?;
                strm.msg_send(&codec, &msg).await?;
                Ok(true)
            }
            "EchoBidiStream" => {
                loop {
                    match strm.msg_recv::<Codec, EchoMsg>(&codec).await {
                        Ok(msg) => strm.msg_send(&codec, &msg).await?,
                        Err(RpcErr::Eof) | Err(RpcErr::Canceled) => return Ok(true),
                        Err(e) => return Err(e),
                    }
                }
            }
            "DoNothing" => {
                let _: Empty = strm.msg_recv(&codec).await?;
                strm.msg_send(&codec, &Empty {}).await?;
                Ok(true)
            }
            "RpcStream" => {
                let getter = MuxGetter { mux: self.rpc_stream_mux.clone() };
                handle_rpc_stream::<R, Codec>(strm, &getter).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl<R: AsyncRT> Handler for EchoServer<R> {
    fn service_id(&self) -> &str {
        ECHO_SERVICE
    }

    fn method_ids(&self) -> Vec<&str> {
        vec![
            "Echo",
            "EchoServerStream",
            "EchoClientStream",
            "EchoBidiStream",
            "DoNothing",
            "RpcStream",
        ]
    }
}

/// An echo mux whose RpcStream method tunnels into a nested mux serving the
/// same echo service.
pub fn echo_mux<R: AsyncRT>() -> Arc<Mux> {
    let nested = Arc::new(Mux::new());
    nested.register(Arc::new(EchoServer::<R>::new(None))).expect("register nested");
    let mux = Arc::new(Mux::new());
    mux.register(Arc::new(EchoServer::<R>::new(Some(nested)))).expect("register");
    mux
}
