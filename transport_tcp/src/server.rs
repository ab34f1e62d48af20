use crate::net::{read_frame, write_loop};
use crossfire::mpmc;
use futures::future::{AbortHandle, Abortable};
use starpc::transport::ChannelWriter;
use starpc::{ArcInvoker, ArcWriter, RpcErr, ServerRpc};
use starpc_core::{Codec, RpcConfig, runtime::AsyncRT};
use starpc_tokio::TokioRT;
use std::io;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};

/// A TCP server answering each connection with a dedicated call stream
/// dispatched against the invoker.
pub struct TcpServer<C: Codec> {
    invoker: ArcInvoker,
    config: RpcConfig,
    listeners_abort: Vec<(AbortHandle, String)>,
    conn_ref_count: Arc<()>,
    _codec: PhantomData<C>,
}

impl<C: Codec> TcpServer<C> {
    pub fn new(invoker: ArcInvoker, config: RpcConfig) -> Self {
        Self {
            invoker,
            config,
            listeners_abort: Vec::new(),
            conn_ref_count: Arc::new(()),
            _codec: PhantomData,
        }
    }

    /// Bind and start accepting; returns the actual local address.
    pub async fn listen(&mut self, addr: &str) -> io::Result<String> {
        let listener = match TcpListener::bind(addr).await {
            Err(e) => {
                error!("bind addr {:?} err: {}", addr, e);
                return Err(e);
            }
            Ok(l) => l,
        };
        let local_addr = listener.local_addr()?.to_string();
        debug!("listening on {:?}", local_addr);

        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let invoker = self.invoker.clone();
        let config = self.config.clone();
        let conn_ref_count = self.conn_ref_count.clone();
        let accept_loop = Abortable::new(
            async move {
                loop {
                    match listener.accept().await {
                        Err(e) => {
                            warn!("listener accept error: {}", e);
                            return;
                        }
                        Ok((conn, peer)) => {
                            trace!("accepted conn from {:?}", peer);
                            let _ = conn.set_nodelay(true);
                            tokio::spawn(Self::serve_conn(
                                conn,
                                invoker.clone(),
                                config.clone(),
                                conn_ref_count.clone(),
                            ));
                        }
                    }
                }
            },
            abort_registration,
        );
        tokio::spawn(accept_loop);
        self.listeners_abort.push((abort_handle, format!("listener {:?}", local_addr)));
        Ok(local_addr)
    }

    async fn serve_conn(conn: TcpStream, invoker: ArcInvoker, config: RpcConfig, conn_count: Arc<()>) {
        let _conn_count = conn_count;
        let (mut rd, wr) = conn.into_split();

        let (tx, rx) = mpmc::unbounded_async::<Vec<u8>>();
        tokio::spawn(write_loop(wr, rx));

        let writer: ArcWriter = Arc::new(ChannelWriter::new_framed(tx, Arc::new(C::default())));
        let server_rpc = ServerRpc::<TokioRT, C>::new(invoker, writer);

        loop {
            match read_frame(&mut rd, config.max_frame_len).await {
                Ok(None) => {
                    server_rpc.handle_stream_close(Some(RpcErr::Eof)).await;
                    return;
                }
                Err(e) => {
                    warn!("tcp conn read err: {}", e);
                    server_rpc.handle_stream_close(Some(RpcErr::from(e))).await;
                    return;
                }
                Ok(Some(frame)) => match server_rpc.handle_packet_data(&frame).await {
                    Ok(()) => {}
                    // a malformed packet ends the connection; call-state
                    // errors leave the call as it was
                    Err(e) if e.is_protocol() => {
                        warn!("tcp conn packet err: {}", e);
                        server_rpc.handle_stream_close(Some(e)).await;
                        return;
                    }
                    Err(_) => {}
                },
            }
        }
    }

    #[inline]
    fn alive_conns(&self) -> usize {
        Arc::strong_count(&self.conn_ref_count) - 1
    }

    /// Gracefully close the server: stop the listeners, then wait up to
    /// `server_close_wait` for live connections to drain.
    pub async fn close(&mut self) {
        for (handle, info) in &self.listeners_abort {
            handle.abort();
            info!("{} has closed", info);
        }
        self.listeners_abort.clear();

        let start_ts = Instant::now();
        let mut alive = self.alive_conns();
        while alive > 0 {
            TokioRT::sleep(std::time::Duration::from_millis(100)).await;
            alive = self.alive_conns();
            if start_ts.elapsed() > self.config.server_close_wait {
                warn!("closed while {} conn still alive", alive);
                break;
            }
        }
        info!("server closed with alive conn {}", alive);
    }
}
