//! Engine-level tests through the public API, over the in-memory pipe.

use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};
use starpc::transport::PipeTransport;
use starpc::{ArcStream, Client, Handler, Invoker, Mux, RpcErr, StreamExt};
use starpc_codec::MsgpCodec;
use starpc_tokio::TokioRT;
use std::sync::Arc;

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
struct TextMsg {
    text: String,
}

struct Reverser;

#[async_trait]
impl Invoker for Reverser {
    async fn invoke_method(
        &self, service_id: &str, method_id: &str, strm: ArcStream,
    ) -> Result<bool, RpcErr> {
        if !service_id.is_empty() && service_id != "strings.Reverser" {
            return Ok(false);
        }
        if method_id != "Reverse" {
            return Ok(false);
        }
        let codec = MsgpCodec::default();
        let msg: TextMsg = strm.msg_recv(&codec).await?;
        let reversed = TextMsg { text: msg.text.chars().rev().collect() };
        strm.msg_send(&codec, &reversed).await?;
        Ok(true)
    }
}

impl Handler for Reverser {
    fn service_id(&self) -> &str {
        "strings.Reverser"
    }

    fn method_ids(&self) -> Vec<&str> {
        vec!["Reverse"]
    }
}

fn reverser_client() -> Client<PipeTransport<TokioRT, MsgpCodec>, MsgpCodec> {
    let mux = Arc::new(Mux::new());
    mux.register(Arc::new(Reverser)).expect("register");
    Client::new(PipeTransport::new(mux))
}

#[tokio::test]
async fn test_pipe_unary() {
    let client = reverser_client();
    let out: TextMsg = client
        .exec_call("strings.Reverser", "Reverse", &TextMsg { text: "desrever".to_string() })
        .await
        .expect("reverse");
    assert_eq!(out.text, "reversed");
}

#[tokio::test]
async fn test_pipe_empty_service_dispatch() {
    let client = reverser_client();
    // an empty service id matches on the method name alone
    let out: TextMsg = client
        .exec_call("", "Reverse", &TextMsg { text: "ba".to_string() })
        .await
        .expect("reverse");
    assert_eq!(out.text, "ab");
}

#[tokio::test]
async fn test_pipe_unimplemented() {
    let client = reverser_client();
    let res: Result<TextMsg, RpcErr> =
        client.exec_call("strings.Reverser", "Uppercase", &TextMsg::default()).await;
    assert_eq!(res.err(), Some(RpcErr::Unimplemented));
}
