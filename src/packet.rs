//! Control packets exchanged between the two sides of a call.
//!
//! A packet carries exactly one of three bodies: CallStart begins a call and
//! may carry the first payload, CallData carries one streaming message and/or
//! the completion marker, CallCancel aborts the call. The wire layout is
//! whatever the configured [Codec](starpc_core::Codec) produces; this module
//! only fixes the structure.

use serde_derive::{Deserialize, Serialize};
use starpc_core::error::RpcErr;

/// Begins a call; may carry the first request payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallStart {
    pub rpc_service: String,
    pub rpc_method: String,
    pub data: Vec<u8>,
    /// Distinguishes an explicit zero-length payload from no payload at all.
    pub data_is_zero: bool,
}

/// One streaming message, a completion marker, or both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallData {
    pub data: Vec<u8>,
    pub data_is_zero: bool,
    pub complete: bool,
    /// Non-empty error implies complete.
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PacketBody {
    CallStart(CallStart),
    CallData(CallData),
    CallCancel(bool),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Packet {
    pub body: Option<PacketBody>,
}

impl Packet {
    pub fn call_start(service: &str, method: &str, data: Vec<u8>, data_is_zero: bool) -> Self {
        Self {
            body: Some(PacketBody::CallStart(CallStart {
                rpc_service: service.to_string(),
                rpc_method: method.to_string(),
                data,
                data_is_zero,
            })),
        }
    }

    /// Constructs a CallData packet. `complete` is forced whenever `err` is
    /// set, and `data_is_zero` only survives for an actually empty payload.
    pub fn call_data(data: Vec<u8>, data_is_zero: bool, complete: bool, err: Option<&RpcErr>) -> Self {
        let mut error = String::new();
        let mut complete = complete;
        if let Some(e) = err {
            complete = true;
            error = e.to_string();
        }
        let data_is_zero = data.is_empty() && data_is_zero;
        Self { body: Some(PacketBody::CallData(CallData { data, data_is_zero, complete, error })) }
    }

    pub fn call_cancel() -> Self {
        Self { body: Some(PacketBody::CallCancel(true)) }
    }

    /// Cursory structural validation. Every packet handler calls this before
    /// interpreting the body.
    pub fn validate(&self) -> Result<(), RpcErr> {
        match self.body.as_ref() {
            Some(PacketBody::CallStart(start)) => start.validate(),
            Some(PacketBody::CallData(data)) => data.validate(),
            Some(PacketBody::CallCancel(_)) => Ok(()),
            None => Err(RpcErr::UnrecognizedPacket),
        }
    }
}

impl CallStart {
    pub fn validate(&self) -> Result<(), RpcErr> {
        if self.rpc_method.is_empty() {
            return Err(RpcErr::EmptyMethodID);
        }
        if self.rpc_service.is_empty() {
            return Err(RpcErr::EmptyServiceID);
        }
        Ok(())
    }
}

impl CallData {
    pub fn validate(&self) -> Result<(), RpcErr> {
        if self.data.is_empty() && !self.complete && self.error.is_empty() && !self.data_is_zero {
            return Err(RpcErr::EmptyPacket);
        }
        Ok(())
    }
}
