//! Broker abstraction.
//!
//! A [`Transport`] opens [`Link`]s to the broker. Links are dumb: they execute
//! one request at a time and surface inbound deliveries. Reconnects, queueing
//! and resubscription live one level up, in the connection manager.

mod memory;
#[cfg(feature = "redis")]
mod redis_pubsub;

use std::{fmt, future::Future, sync::Arc};

use crate::Result;

pub use memory::{DEFAULT_HISTORY, MemoryLink, MemoryTransport};
#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisLink, RedisTransport};

/// What a link is used for.
///
/// Publisher links only ever send; subscriber links send subscribe requests
/// and receive deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Publisher,
    Subscriber,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publisher => write!(f, "publisher"),
            Role::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// A single broker request. The channel name is the event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Publish(Arc<str>),
    Subscribe(Arc<str>),
    Unsubscribe(Arc<str>),
}

impl Request {
    pub fn channel(&self) -> &str {
        match self {
            Request::Publish(c) | Request::Subscribe(c) | Request::Unsubscribe(c) => c,
        }
    }
}

/// A message received on a subscribed channel.
///
/// `payload` is kept as received. An empty payload is the only valid one;
/// anything else is rejected by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: Arc<str>,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn new(channel: impl Into<Arc<str>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// A well-formed signal: the channel name and nothing else.
    pub fn signal(channel: impl Into<Arc<str>>) -> Self {
        Self::new(channel, Vec::new())
    }
}

/// Opens links to the broker.
///
/// Implementations should fail fast: the caller retries with backoff.
/// Authentication, when configured, belongs to `open` so that it runs after
/// every successful connect.
pub trait Transport: Send + Sync + 'static {
    type Link: Link;

    fn open(&self, role: Role) -> impl Future<Output = Result<Self::Link>> + Send;
}

/// One live connection to the broker.
pub trait Link: Send + 'static {
    /// Execute a request.
    ///
    /// An error for which [`Error::is_link_lost`](crate::Error::is_link_lost)
    /// holds means the link is dead. Any other error refuses this request only.
    fn execute(&mut self, request: &Request) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next delivery. `None` means the link has dropped.
    ///
    /// Must be cancel safe: it is raced against the request queue.
    fn next_delivery(&mut self) -> impl Future<Output = Option<Delivery>> + Send;
}
