use crate::echo::*;
use crate::*;
use async_trait::async_trait;
use rstest::rstest;
use starpc::rpcstream::{RpcStreamCaller, new_rpc_stream_client};
use starpc::transport::PipeTransport;
use starpc::{ArcStream, Client, Mux, RpcErr, Stream};
use std::sync::Arc;

/// Opens the outer bidi call that tunneled sessions run over.
struct EchoStreamCaller {
    client: Arc<Client<PipeTransport<RT, Codec>, Codec>>,
}

#[async_trait]
impl RpcStreamCaller for EchoStreamCaller {
    async fn call_rpc_stream(&self) -> Result<ArcStream, RpcErr> {
        self.client.new_stream::<EchoMsg>(ECHO_SERVICE, "RpcStream", None).await
    }
}

fn tunnel_caller(mux: Arc<Mux>) -> Arc<dyn RpcStreamCaller> {
    Arc::new(EchoStreamCaller { client: Arc::new(Client::new(PipeTransport::new(mux))) })
}

#[logfn]
#[rstest]
fn test_rpcstream_tunnel_echo(runner: TestRunner) {
    runner.block_on(async move {
        let caller = tunnel_caller(echo_mux::<RT>());
        let tunneled = new_rpc_stream_client::<RT, Codec>(caller, "", true);
        let out: EchoMsg = tunneled
            .exec_call(ECHO_SERVICE, "Echo", &EchoMsg { body: TEST_BODY.to_string() })
            .await
            .expect("tunneled echo");
        assert_eq!(out.body, TEST_BODY);
    });
}

#[logfn]
#[rstest]
fn test_rpcstream_tunnel_streaming(runner: TestRunner) {
    runner.block_on(async move {
        use starpc::StreamExt;
        let codec = Codec::default();
        let caller = tunnel_caller(echo_mux::<RT>());
        let tunneled = new_rpc_stream_client::<RT, Codec>(caller, "", true);
        let strm = tunneled
            .new_stream::<EchoMsg>(ECHO_SERVICE, "EchoBidiStream", None)
            .await
            .expect("tunneled stream");
        for _ in 0..3 {
            strm.msg_send(&codec, &EchoMsg { body: TEST_BODY.to_string() }).await.expect("send");
            let out: EchoMsg = strm.msg_recv(&codec).await.expect("recv");
            assert_eq!(out.body, TEST_BODY);
        }
        strm.close().await.expect("close");
    });
}

#[logfn]
#[rstest]
fn test_rpcstream_component_not_found(runner: TestRunner) {
    runner.block_on(async move {
        // a server whose RpcStream method has no nested mux refuses the ack
        let mux = Arc::new(Mux::new());
        mux.register(Arc::new(EchoServer::<RT>::new(None))).expect("register");
        let caller = tunnel_caller(mux);
        let tunneled = new_rpc_stream_client::<RT, Codec>(caller, "missing", true);
        let res: Result<EchoMsg, RpcErr> = tunneled
            .exec_call(ECHO_SERVICE, "Echo", &EchoMsg { body: TEST_BODY.to_string() })
            .await;
        assert_eq!(res.err(), Some(RpcErr::Unimplemented));
    });
}
