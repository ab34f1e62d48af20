mod codec;
pub use codec::{Codec, FRAME_PREFIX_LEN};
mod config;
pub use config::RpcConfig;
pub mod error;
pub mod runtime;
