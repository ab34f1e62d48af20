use super::CommonRpc;
use crate::packet::{Packet, PacketBody};
use crate::writer::ArcWriter;
use starpc_core::{Codec, error::RpcErr};
use std::ops::Deref;
use std::sync::Arc;

/// Caller side of an on-going call.
///
/// Cheap to clone; the transport callbacks and the caller share the same
/// underlying [CommonRpc].
pub struct ClientRpc<C: Codec> {
    common: Arc<CommonRpc>,
    codec: Arc<C>,
}

impl<C: Codec> Clone for ClientRpc<C> {
    #[inline]
    fn clone(&self) -> Self {
        Self { common: self.common.clone(), codec: self.codec.clone() }
    }
}

impl<C: Codec> Deref for ClientRpc<C> {
    type Target = CommonRpc;

    #[inline]
    fn deref(&self) -> &CommonRpc {
        &self.common
    }
}

impl<C: Codec> ClientRpc<C> {
    /// Construct the idle call state; [ClientRpc::start] attaches the writer.
    pub fn new(service: &str, method: &str) -> Self {
        Self {
            common: Arc::new(CommonRpc::new(service, method, None)),
            codec: Arc::new(C::default()),
        }
    }

    pub(crate) fn common(&self) -> &Arc<CommonRpc> {
        &self.common
    }

    /// Attach the writer and emit the CallStart packet, with the first
    /// request payload when `write_first_msg` is set. Must be called at most
    /// once; a call canceled before starting closes the writer immediately.
    pub async fn start(
        &self, writer: ArcWriter, write_first_msg: bool, first_msg: Vec<u8>,
    ) -> Result<(), RpcErr> {
        if self.common.is_canceled() {
            let _ = writer.close().await;
            return Err(RpcErr::Canceled);
        }
        self.common.set_writer(writer.clone())?;

        let (data, data_is_zero) = if write_first_msg {
            let zero = first_msg.is_empty();
            (first_msg, zero)
        } else {
            (Vec::new(), false)
        };
        let pkt = Packet::call_start(&self.common.service(), &self.common.method(), data, data_is_zero);
        if let Err(e) = writer.write_packet(pkt).await {
            warn!("rpc {}::{} start write err: {}", self.common.service(), self.common.method(), e);
            self.common.cancel();
            let _ = writer.close().await;
            return Err(e);
        }
        Ok(())
    }

    /// Parse one inbound framed packet body and dispatch it.
    pub async fn handle_packet_data(&self, data: &[u8]) -> Result<(), RpcErr> {
        let pkt: Packet = self.codec.decode(data)?;
        self.handle_packet(pkt).await
    }

    pub async fn handle_packet(&self, pkt: Packet) -> Result<(), RpcErr> {
        pkt.validate()?;
        match pkt.body {
            // server-to-client calls not supported
            Some(PacketBody::CallStart(_)) => Err(RpcErr::UnrecognizedPacket),
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

    /// The transport under this call closed, with `Eof` for a clean close.
    pub async fn handle_stream_close(&self, close_err: Option<RpcErr>) {
        self.common.handle_stream_close(close_err).await;
    }

    /// Release any resources held by the call. If the call ever started, a
    /// CallCancel is sent first (suppressed when this side already
    /// completed).
    pub async fn close(&self) {
        if self.common.writer().is_some() {
            let _ = self.common.write_call_cancel().await;
            self.common.teardown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::tests::RecordingWriter;
    use futures::executor::block_on;
    use starpc_codec::MsgpCodec;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_start_writes_call_start() {
        let writer = RecordingWriter::new();
        let rpc = ClientRpc::<MsgpCodec>::new("echo.Echoer", "Echo");
        block_on(async {
            rpc.start(writer.clone(), true, b"req".to_vec()).await.expect("start");
        });
        let sent = writer.sent.lock().unwrap();
        match sent[0].body.as_ref() {
            Some(PacketBody::CallStart(s)) => {
                assert_eq!(s.rpc_service, "echo.Echoer");
                assert_eq!(s.rpc_method, "Echo");
                assert_eq!(s.data, b"req");
                assert!(!s.data_is_zero);
            }
            _ => panic!("expected CallStart"),
        }
    }

    #[test]
    fn test_start_twice_rejected() {
        let writer = RecordingWriter::new();
        let rpc = ClientRpc::<MsgpCodec>::new("echo.Echoer", "Echo");
        block_on(async {
            rpc.start(writer.clone(), false, Vec::new()).await.expect("start");
            assert_eq!(rpc.start(writer.clone(), false, Vec::new()).await, Err(RpcErr::Completed));
        });
    }

    #[test]
    fn test_start_after_cancel() {
        let writer = RecordingWriter::new();
        let rpc = ClientRpc::<MsgpCodec>::new("echo.Echoer", "Echo");
        rpc.cancel();
        block_on(async {
            assert_eq!(
                rpc.start(writer.clone(), false, Vec::new()).await,
                Err(RpcErr::Canceled)
            );
        });
        assert!(writer.closed.load(Ordering::Acquire));
        assert!(writer.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_inbound_call_start_rejected() {
        let rpc = ClientRpc::<MsgpCodec>::new("echo.Echoer", "Echo");
        let pkt = Packet::call_start("svc", "method", Vec::new(), false);
        block_on(async {
            assert_eq!(rpc.handle_packet(pkt).await, Err(RpcErr::UnrecognizedPacket));
        });
    }

    #[test]
    fn test_handle_packet_data_garbage() {
        let rpc = ClientRpc::<MsgpCodec>::new("echo.Echoer", "Echo");
        block_on(async {
            assert_eq!(rpc.handle_packet_data(&[0xc1, 0xff]).await, Err(RpcErr::InvalidMessage));
        });
    }

    #[test]
    fn test_close_sends_single_cancel() {
        let writer = RecordingWriter::new();
        let rpc = ClientRpc::<MsgpCodec>::new("echo.Echoer", "Echo");
        block_on(async {
            rpc.start(writer.clone(), false, Vec::new()).await.expect("start");
            rpc.close().await;
            rpc.close().await;
        });
        // CallStart plus exactly one CallCancel
        assert_eq!(writer.sent.lock().unwrap().len(), 2);
        assert_eq!(writer.terminal_count(), 1);
        assert!(writer.closed.load(Ordering::Acquire));
    }
}
