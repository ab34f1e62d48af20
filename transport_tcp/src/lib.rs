#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # starpc-tcp
//!
//! TCP transport for [`starpc`](https://docs.rs/starpc), backed by tokio.
//!
//! Packets travel as frames with a 4-byte little-endian length prefix. Each
//! TCP connection carries exactly one call stream: the client dials one
//! connection per call, the server answers each connection with a dedicated
//! [ServerRpc](starpc::ServerRpc).

#[macro_use]
extern crate captains_log;

mod net;
pub use net::read_frame;
mod client;
pub use client::TcpOpener;
mod server;
pub use server::TcpServer;
