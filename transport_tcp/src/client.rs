use crate::net::{read_frame, write_loop};
use async_trait::async_trait;
use crossfire::mpmc;
use starpc::transport::ChannelWriter;
use starpc::{ArcWriter, CloseHandler, MsgHandler, OpenStream, RpcErr};
use starpc_core::{Codec, RpcConfig};
use std::sync::Arc;
use tokio::net::TcpStream;

/// Dials one TCP connection per opened stream.
pub struct TcpOpener<C: Codec> {
    addr: String,
    config: RpcConfig,
    codec: Arc<C>,
}

impl<C: Codec> TcpOpener<C> {
    pub fn new(addr: &str, config: RpcConfig) -> Self {
        Self { addr: addr.to_string(), config, codec: Arc::new(C::default()) }
    }
}

#[async_trait]
impl<C: Codec> OpenStream for TcpOpener<C> {
    async fn open_stream(
        &self, msg_handler: MsgHandler, close_handler: CloseHandler,
    ) -> Result<ArcWriter, RpcErr> {
        let conn = match tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(&self.addr),
        )
        .await
        {
            Err(_) => {
                warn!("tcp connect {:?} timeout", self.addr);
                return Err(RpcErr::Remote(format!("connect {} timeout", self.addr)));
            }
            Ok(Err(e)) => {
                warn!("tcp connect {:?} err: {}", self.addr, e);
                return Err(RpcErr::from(e));
            }
            Ok(Ok(conn)) => conn,
        };
        let _ = conn.set_nodelay(true);
        let (mut rd, wr) = conn.into_split();

        let (tx, rx) = mpmc::unbounded_async::<Vec<u8>>();
        tokio::spawn(write_loop(wr, rx));

        let max_frame_len = self.config.max_frame_len;
        tokio::spawn(async move {
            loop {
                match read_frame(&mut rd, max_frame_len).await {
                    Ok(None) => {
                        close_handler(Some(RpcErr::Eof)).await;
                        return;
                    }
                    Err(e) => {
                        close_handler(Some(RpcErr::from(e))).await;
                        return;
                    }
                    Ok(Some(frame)) => {
                        if let Err(e) = msg_handler(frame).await {
                            if e.is_protocol() {
                                warn!("tcp inbound packet err: {}", e);
                                close_handler(Some(e)).await;
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(Arc::new(ChannelWriter::new_framed(tx, self.codec.clone())))
    }
}
