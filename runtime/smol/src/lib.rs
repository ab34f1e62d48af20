#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # starpc-smol
//!
//! This crate provides a runtime adapter for [`starpc`](https://docs.rs/starpc) to work with the `smol` runtime.
//! It implements the [`AsyncRT`](https://docs.rs/starpc-core/latest/starpc_core/runtime/index.html) trait on top of the global smol executor.

use starpc_core::runtime::AsyncRT;
use std::future::Future;
use std::time::Duration;

/// Assign this type to the AsyncRT generic of the engine when running on smol.
pub struct SmolRT();

impl AsyncRT for SmolRT {
    #[inline(always)]
    fn spawn_detach<F, R>(f: F)
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        smol::spawn(f).detach();
    }

    #[inline(always)]
    fn sleep(d: Duration) -> impl Future<Output = ()> + Send {
        async move {
            smol::Timer::after(d).await;
        }
    }
}
