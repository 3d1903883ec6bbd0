use std::sync::Arc;

use crate::Role;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A delivery carried a payload. Signals are payload-less by contract,
    /// so this is never masked.
    #[error("Protocol violation on '{event}': expected an empty payload, got {len} bytes")]
    ProtocolViolation { event: Arc<str>, len: usize },

    #[error("Broker link is down: {0}")]
    Disconnected(Arc<str>),

    /// The broker refused one request. The link itself is still usable.
    #[error("Broker rejected '{channel}': {reason}")]
    Rejected { channel: Arc<str>, reason: Arc<str> },

    #[error("Request is not supported on a {0} link")]
    Unsupported(Role),

    #[error("Connection has been closed")]
    ConnectionClosed,

    #[error("Invalid broker configuration: {0}")]
    InvalidConfig(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl Error {
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::ProtocolViolation { .. })
    }

    /// Whether the error comes from the broker link rather than from the caller
    /// or from a publisher.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Disconnected(_) | Error::Rejected { .. } | Error::Unsupported(_) => true,
            #[cfg(feature = "redis")]
            Error::Redis(_) => true,
            _ => false,
        }
    }

    /// Whether the link that produced this error is gone and must be
    /// replaced. Any other request failure is a refusal of that one request.
    pub fn is_link_lost(&self) -> bool {
        match self {
            Error::Disconnected(_) => true,
            #[cfg(feature = "redis")]
            Error::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_unrecoverable_error()
            }
            _ => false,
        }
    }
}
