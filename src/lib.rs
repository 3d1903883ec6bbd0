//! Nudge - cluster-wide, payload-less signaling
//!
//! Attach any object (a "context") to a [`Dispatcher`], subscribe listeners to
//! named events on it, and publish event names from any process connected to
//! the same broker. Every matching subscription in the cluster is notified.
//! Signals never carry data: a listener learns *that* something changed and
//! re-fetches the authoritative state itself, so access control stays where
//! the data lives.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nudge::{Config, Dispatcher, Listener, transport::RedisTransport};
//!
//! struct Restaurant;
//!
//! # #[tokio::main]
//! # async fn main() -> nudge::Result<()> {
//! let dispatcher = Dispatcher::<Restaurant, RedisTransport>::start(Config::new(6379, "localhost"))?;
//! let ctx = Arc::new(Restaurant);
//! let handle = dispatcher.attach(&ctx);
//! handle.subscribe("change:restaurant", &Listener::new(|_: &Restaurant, event: &str| {
//!     println!("{event}: reloading");
//! }));
//! dispatcher.publish("change:restaurant");
//! # Ok(())
//! # }
//! ```
//!
//! See `demos/restaurant.rs`.

mod config;
mod context_handle;
mod dispatch;
mod dispatcher;
mod error;
mod listener;
mod publisher;

mod internal;

pub mod transport;

pub use config::Config;
pub use context_handle::ContextHandle;
pub use dispatch::Dispatch;
pub use dispatcher::Dispatcher;
pub use error::Error;
pub use listener::Listener;
pub use publisher::Publisher;

pub type Result<T = ()> = std::result::Result<T, Error>;

pub use transport::Role;
