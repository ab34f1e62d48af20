//! End-to-end scenarios for the starpc engine, run over the in-memory pipe
//! transport and (with the `tokio` feature) over TCP.

pub mod echo;
#[cfg(test)]
mod tests;

extern crate captains_log;
extern crate log;
pub use captains_log::logfn;

use captains_log::*;
use rstest::*;
use std::fmt;
use std::future::Future;

#[cfg(feature = "tokio")]
use tokio::runtime::Runtime;

#[cfg(feature = "tokio")]
pub type RT = starpc_tokio::TokioRT;
#[cfg(not(feature = "tokio"))]
pub type RT = starpc_smol::SmolRT;

pub type Codec = starpc_codec::MsgpCodec;

#[fixture]
pub fn runner() -> TestRunner {
    TestRunner::new()
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "")
    }
}

pub struct TestRunner {
    #[cfg(feature = "tokio")]
    rt: Runtime,
}

impl TestRunner {
    pub fn new() -> Self {
        recipe::raw_file_logger("/tmp/starpc_test.log", Level::Trace).test().build().expect("log");
        Self {
            #[cfg(feature = "tokio")]
            rt: tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap(),
        }
    }

    pub fn block_on<F: Future<Output = ()> + Send + 'static>(&self, f: F) {
        #[cfg(feature = "tokio")]
        {
            self.rt.block_on(f);
        }
        #[cfg(not(feature = "tokio"))]
        {
            smol::block_on(f);
        }
    }
}
