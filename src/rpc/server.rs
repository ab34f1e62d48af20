use super::CommonRpc;
use crate::mux::ArcInvoker;
use crate::packet::{CallStart, Packet, PacketBody};
use crate::stream::{ArcStream, CloseCb, MsgStream};
use crate::writer::ArcWriter;
use starpc_core::{Codec, error::RpcErr, runtime::AsyncRT};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// Callee side of an on-going call.
///
/// Constructed per transport stream with the writer already attached. The
/// first CallStart launches a detached worker task that runs the user
/// handler; the worker always emits the terminal CallData packet last and
/// then closes the writer.
pub struct ServerRpc<R: AsyncRT, C: Codec> {
    common: Arc<CommonRpc>,
    invoker: ArcInvoker,
    codec: Arc<C>,
    _rt: PhantomData<R>,
}

impl<R: AsyncRT, C: Codec> Clone for ServerRpc<R, C> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            common: self.common.clone(),
            invoker: self.invoker.clone(),
            codec: self.codec.clone(),
            _rt: PhantomData,
        }
    }
}

impl<R: AsyncRT, C: Codec> Deref for ServerRpc<R, C> {
    type Target = CommonRpc;

    #[inline]
    fn deref(&self) -> &CommonRpc {
        &self.common
    }
}

impl<R: AsyncRT, C: Codec> ServerRpc<R, C> {
    pub fn new(invoker: ArcInvoker, writer: ArcWriter) -> Self {
        Self {
            common: Arc::new(CommonRpc::new("", "", Some(writer))),
            invoker,
            codec: Arc::new(C::default()),
            _rt: PhantomData,
        }
    }

    /// True once a CallStart was accepted and the worker dispatched.
    pub fn started(&self) -> bool {
        !self.common.service().is_empty() || !self.common.method().is_empty()
    }

    /// Parse one inbound framed packet body and dispatch it.
    pub async fn handle_packet_data(&self, data: &[u8]) -> Result<(), RpcErr> {
        let pkt: Packet = self.codec.decode(data)?;
        self.handle_packet(pkt).await
    }

    pub async fn handle_packet(&self, pkt: Packet) -> Result<(), RpcErr> {
        pkt.validate()?;
        match pkt.body {
            Some(PacketBody::CallStart(start)) => self.handle_call_start(start),
            Some(PacketBody::CallData(data)) => self.common.handle_call_data(data),
            Some(PacketBody::CallCancel(cancel)) => {
                if cancel {
                    self.common.handle_call_cancel().await
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    fn handle_call_start(&self, pkt: CallStart) -> Result<(), RpcErr> {
        self.common.accept_call_start(&pkt.rpc_service, &pkt.rpc_method, pkt.data, pkt.data_is_zero)?;
        debug!("rpc {}::{} started", pkt.rpc_service, pkt.rpc_method);
        let rpc = self.clone();
        R::spawn_detach(async move {
            rpc.invoke_rpc(pkt.rpc_service, pkt.rpc_method).await;
        });
        Ok(())
    }

    /// Worker body: run the handler against a stream view of this call,
    /// then finish the call on the wire whatever the outcome.
    async fn invoke_rpc(self, service: String, method: String) {
        let close_cb: CloseCb = {
            let common = self.common.clone();
            Box::new(move || {
                let common = common.clone();
                Box::pin(async move {
                    common.cancel();
                })
            })
        };
        let strm: ArcStream = Arc::new(MsgStream::new(self.common.clone(), Some(close_cb)));

        let err = match self.invoker.invoke_method(&service, &method, strm).await {
            Ok(true) => None,
            Ok(false) => Some(RpcErr::Unimplemented),
            Err(e) => {
                warn!("rpc {}::{} handler err: {}", service, method, e);
                Some(e)
            }
        };

        // the terminal packet is the last outbound packet of the call; it is
        // suppressed when the handler already completed this side itself
        let _ = self.common.write_call_data(Vec::new(), false, true, err).await;
        if let Some(w) = self.common.writer() {
            let _ = w.close().await;
        }
        self.common.cancel();
        trace!("rpc {}::{} finished", service, method);
    }

    /// The transport under this call closed. A clean close (or a plain
    /// cancel) only seals the read side, so an in-flight worker can still
    /// emit its terminal packet; an abnormal transport error tears the call
    /// down.
    pub async fn handle_stream_close(&self, close_err: Option<RpcErr>) {
        let abnormal = match close_err.as_ref() {
            Some(RpcErr::Eof) | Some(RpcErr::Canceled) | None => false,
            Some(_) => true,
        };
        self.common.close_read(close_err);
        if abnormal {
            self.close().await;
        }
    }

    /// Release resources held by the call.
    pub async fn close(&self) {
        if !self.started() {
            // no worker owns the writer, close it here
            if let Some(w) = self.common.writer() {
                let _ = w.close().await;
            }
        }
        self.common.close_read(Some(RpcErr::Canceled));
        self.common.cancel();
    }
}
