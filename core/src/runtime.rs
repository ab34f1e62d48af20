//! The runtime model defines the interface to adapt various async runtimes.
//!
//! The adaptors are provided as sub-crates:
//!
//! - [starpc-tokio](https://docs.rs/starpc-tokio)
//!
//! - [starpc-smol](https://docs.rs/starpc-smol)
//!
//! The engine only needs two capabilities from the host runtime: detaching a
//! task (the per-call server worker and the tunnel read pump), and sleeping.

use std::future::Future;
use std::time::Duration;

/// Defines the interface we use from the async runtime
///
/// See module level doc: [crate::runtime]
pub trait AsyncRT: Send + Sync + 'static {
    /// Spawn a task on the runtime without keeping a handle to it.
    fn spawn_detach<F, R>(f: F)
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static;

    fn sleep(d: Duration) -> impl Future<Output = ()> + Send;
}
