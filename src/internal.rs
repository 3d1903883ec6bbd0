mod backoff;
mod connection;
mod registry;
mod router;

pub(crate) use backoff::Backoff;
pub(crate) use connection::Connection;
pub(crate) use registry::Registry;
pub(crate) use router::Router;
