use std::fmt;
use std::str::FromStr;

/// Error kinds surfaced by the rpc engine.
///
/// Every kind has a stable display string: the string is what travels in the
/// `error` field of a terminal CallData packet, and the receiving side maps
/// it back with [RpcErr::from_remote]. An error string that does not parse
/// into a known kind is preserved verbatim in [RpcErr::Remote].
#[derive(strum::Display, strum::EnumString, PartialEq, Eq, Clone, thiserror::Error)]
pub enum RpcErr {
    /// The rpc method was not implemented.
    #[strum(serialize = "unimplemented")]
    Unimplemented,
    /// A packet arrived after the rpc was completed.
    #[strum(serialize = "unexpected packet after rpc was completed")]
    Completed,
    /// The packet body variant was not recognized.
    #[strum(serialize = "unrecognized packet type")]
    UnrecognizedPacket,
    /// Nothing was specified in a CallData packet.
    #[strum(serialize = "invalid empty packet")]
    EmptyPacket,
    /// The message failed to parse.
    #[strum(serialize = "invalid message")]
    InvalidMessage,
    /// The method id was empty.
    #[strum(serialize = "method id empty")]
    EmptyMethodID,
    /// The service id was empty.
    #[strum(serialize = "service id empty")]
    EmptyServiceID,
    /// No clients were available to call.
    #[strum(serialize = "no available rpc clients")]
    NoAvailableClients,
    /// A write was attempted before a writer was attached.
    #[strum(serialize = "cannot write to nil writer")]
    NilWriter,
    /// The call was canceled before it finished.
    #[strum(serialize = "context canceled")]
    Canceled,
    /// The remote closed the stream without an error.
    #[strum(serialize = "EOF")]
    Eof,
    /// An error string sent by the remote that is not one of the kinds above.
    #[strum(default)]
    Remote(String),
}

// The default Debug derive just ignores the strum customized strings.
impl fmt::Debug for RpcErr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl RpcErr {
    /// Map an error string received from the remote back into a kind.
    ///
    /// Unknown strings keep their text in [RpcErr::Remote].
    #[inline]
    pub fn from_remote(s: &str) -> Self {
        Self::from_str(s).unwrap_or_else(|_| Self::Remote(s.to_string()))
    }

    /// True for the kinds raised by packet parsing and validation. These
    /// leave the call state untouched, so the transport pumps close the
    /// stream on them while tolerating call-state errors such as a
    /// duplicate completion.
    #[inline]
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::UnrecognizedPacket
                | Self::EmptyPacket
                | Self::InvalidMessage
                | Self::EmptyMethodID
                | Self::EmptyServiceID
        )
    }
}

impl From<std::io::Error> for RpcErr {
    #[inline]
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Eof
        } else {
            Self::Remote(e.to_string())
        }
    }
}
