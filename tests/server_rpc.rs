//! Server call lifecycle at the packet level: the worker runs the handler,
//! emits the terminal packet last, and closes the writer.

use async_trait::async_trait;
use starpc::{
    ArcStream, Codec, Invoker, Packet, PacketBody, PacketWriter, RpcErr, ServerRpc, StreamExt,
};
use starpc_codec::MsgpCodec;
use starpc_tokio::TokioRT;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct CountWriter {
    sent: Mutex<Vec<Packet>>,
    closed: AtomicBool,
}

#[async_trait]
impl PacketWriter for CountWriter {
    async fn write_packet(&self, pkt: Packet) -> Result<(), RpcErr> {
        assert!(!self.closed.load(Ordering::Acquire), "write after close");
        self.sent.lock().unwrap().push(pkt);
        Ok(())
    }

    async fn close(&self) -> Result<(), RpcErr> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct UpperEcho;

#[async_trait]
impl Invoker for UpperEcho {
    async fn invoke_method(
        &self, _service_id: &str, method_id: &str, strm: ArcStream,
    ) -> Result<bool, RpcErr> {
        if method_id != "Upper" {
            return Ok(false);
        }
        let codec = MsgpCodec::default();
        let body: String = strm.msg_recv(&codec).await?;
        strm.msg_send(&codec, &body.to_uppercase()).await?;
        Ok(true)
    }
}

fn start_packet(method: &str) -> Packet {
    let codec = MsgpCodec::default();
    let payload = codec.encode(&"quiet".to_string()).expect("encode");
    Packet::call_start("test.Upper", method, payload, false)
}

#[tokio::test]
async fn test_terminal_packet_is_last() {
    let writer = Arc::new(CountWriter { sent: Mutex::new(Vec::new()), closed: AtomicBool::new(false) });
    let rpc = ServerRpc::<TokioRT, MsgpCodec>::new(Arc::new(UpperEcho), writer.clone());

    rpc.handle_packet(start_packet("Upper")).await.expect("start");
    rpc.wait().await;

    assert!(writer.closed.load(Ordering::Acquire));
    let sent = writer.sent.lock().unwrap();
    let codec = MsgpCodec::default();
    // response payload, then exactly one terminal marker as the last packet
    assert_eq!(sent.len(), 2);
    match sent[0].body.as_ref() {
        Some(PacketBody::CallData(d)) => {
            assert!(!d.complete);
            let body: String = codec.decode(&d.data).expect("decode");
            assert_eq!(body, "QUIET");
        }
        _ => panic!("expected CallData"),
    }
    match sent[1].body.as_ref() {
        Some(PacketBody::CallData(d)) => {
            assert!(d.complete);
            assert!(d.error.is_empty());
            assert!(d.data.is_empty() && !d.data_is_zero);
        }
        _ => panic!("expected terminal CallData"),
    }
}

#[tokio::test]
async fn test_unknown_method_terminal_error() {
    let writer = Arc::new(CountWriter { sent: Mutex::new(Vec::new()), closed: AtomicBool::new(false) });
    let rpc = ServerRpc::<TokioRT, MsgpCodec>::new(Arc::new(UpperEcho), writer.clone());

    rpc.handle_packet(start_packet("Lower")).await.expect("start");
    rpc.wait().await;

    let sent = writer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    match sent[0].body.as_ref() {
        Some(PacketBody::CallData(d)) => {
            assert!(d.complete);
            assert_eq!(d.error, RpcErr::Unimplemented.to_string());
        }
        _ => panic!("expected terminal CallData"),
    }
}

#[tokio::test]
async fn test_second_call_start_rejected() {
    let writer = Arc::new(CountWriter { sent: Mutex::new(Vec::new()), closed: AtomicBool::new(false) });
    let rpc = ServerRpc::<TokioRT, MsgpCodec>::new(Arc::new(UpperEcho), writer.clone());

    rpc.handle_packet(start_packet("Upper")).await.expect("start");
    assert_eq!(rpc.handle_packet(start_packet("Upper")).await, Err(RpcErr::Completed));
    rpc.wait().await;
}

#[tokio::test]
async fn test_call_start_validation() {
    let writer = Arc::new(CountWriter { sent: Mutex::new(Vec::new()), closed: AtomicBool::new(false) });
    let rpc = ServerRpc::<TokioRT, MsgpCodec>::new(Arc::new(UpperEcho), writer.clone());

    let pkt = Packet::call_start("", "Upper", Vec::new(), false);
    assert_eq!(rpc.handle_packet(pkt).await, Err(RpcErr::EmptyServiceID));
    // a validation failure does not start the call
    assert!(!rpc.started());
}
