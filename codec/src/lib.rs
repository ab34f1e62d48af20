#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # starpc-codec
//!
//! This crate provides [starpc_core::Codec](https://docs.rs/starpc-core/latest/starpc_core/trait.Codec.html) implementations for [`starpc`](https://docs.rs/starpc).
//! It supports different serialization formats, such as `msgpack`.

pub use starpc_core::Codec;
#[cfg(feature = "msgpack")]
mod msgpack;
#[cfg(feature = "msgpack")]
pub use msgpack::*;
