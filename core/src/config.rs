use std::time::Duration;

#[derive(Clone)]
pub struct RpcConfig {
    /// Upper bound for a single framed packet on the transport.
    pub max_frame_len: u32,
    /// Connect timeout for client transports.
    pub connect_timeout: Duration,
    /// How long a closing server waits for live connections to drain.
    pub server_close_wait: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_frame_len: 4 * 1024 * 1024,
            connect_timeout: Duration::from_secs(10),
            server_close_wait: Duration::from_secs(30),
        }
    }
}
