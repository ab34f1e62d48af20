#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # starpc-tokio
//!
//! This crate provides a runtime adapter for [`starpc`](https://docs.rs/starpc) to work with the `tokio` runtime.
//! It implements the [`AsyncRT`](https://docs.rs/starpc-core/latest/starpc_core/runtime/index.html) trait.

use starpc_core::runtime::AsyncRT;
use std::future::Future;
use std::time::Duration;

/// Assign this type to the AsyncRT generic of the engine when running on tokio.
///
/// Spawning goes through the ambient runtime handle, so the caller must be
/// inside a tokio context.
pub struct TokioRT();

impl AsyncRT for TokioRT {
    #[inline(always)]
    fn spawn_detach<F, R>(f: F)
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let _ = tokio::spawn(f);
    }

    #[inline(always)]
    fn sleep(d: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(d)
    }
}
