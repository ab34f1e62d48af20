#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # starpc
//!
//! A transport-agnostic streaming rpc engine: request/response and
//! bidirectional streaming calls multiplexed over any reliable, ordered,
//! message-framed channel.
//!
//! The engine exchanges self-delimited control packets between a caller and
//! a callee, keeps per-call state, routes incoming calls to registered
//! handlers, and propagates cancellation and completion in both directions.
//! Concrete transports stay outside: the engine only sees a
//! [PacketWriter] sink and a stream of inbound packet bytes.
//!
//! ## Components
//!
//! `starpc` is built from a collection of crates that provide different
//! functionalities:
//!
//! - [`starpc-core`](https://docs.rs/starpc-core): codec trait, error kinds, runtime adaptor interface
//! - [`starpc-codec`](https://docs.rs/starpc-codec): serialization codecs, such as `msgpack`
//! - runtimes:
//!   - [`starpc-tokio`](https://docs.rs/starpc-tokio): adapter for the `tokio` runtime
//!   - [`starpc-smol`](https://docs.rs/starpc-smol): adapter for the `smol` runtime
//! - transports:
//!   - [`starpc-tcp`](https://docs.rs/starpc-tcp): TCP transport with length-prefixed frames
//!
//! ## Usage
//!
//! 1. Choose your async runtime and codec.
//! 2. Implement [Handler] for your service and register it on a [Mux].
//! 3. Serve the mux over a transport ([`starpc-tcp`](https://docs.rs/starpc-tcp),
//!    or the in-process [transport::PipeTransport]).
//! 4. On the caller side, build a [Client] from the transport's
//!    [OpenStream] factory and use `exec_call` / `new_stream`.
//! 5. To re-mux calls over an established bidi stream, see [rpcstream].

#[macro_use]
extern crate captains_log;

pub mod client;
pub mod mux;
pub mod packet;
pub mod rpc;
pub mod rpcstream;
pub mod stream;
pub mod transport;
pub mod writer;

pub use client::{Client, ClientSet, CloseHandler, MsgHandler, OpenStream};
pub use mux::{ArcHandler, ArcInvoker, Handler, Invoker, Mux};
pub use packet::{CallData, CallStart, Packet, PacketBody};
pub use rpc::{ClientRpc, CommonRpc, ServerRpc};
pub use stream::{ArcStream, CloseCb, MsgStream, Stream, StreamExt};
pub use writer::{ArcWriter, PacketWriter};

// re-export the core so users don't need to depend on multiple crates
pub use starpc_core::{Codec, RpcConfig, error::RpcErr, runtime::AsyncRT};
