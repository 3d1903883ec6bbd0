use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error};

use super::Registry;
use crate::{Error, Result, transport::Delivery};

/// Turns deliveries on a context's subscriber connection into listener calls.
///
/// Holds the context weakly: a context dropped without `detach` simply stops
/// receiving.
pub(crate) struct Router<C> {
    context: Weak<C>,
    registry: Arc<Mutex<Registry<C>>>,
    debug: bool,
}

impl<C: Send + Sync + 'static> Router<C> {
    pub fn new(context: Weak<C>, registry: Arc<Mutex<Registry<C>>>, debug: bool) -> Self {
        Self {
            context,
            registry,
            debug,
        }
    }

    /// Route deliveries until the connection goes away.
    pub async fn run(self, mut receiver: UnboundedReceiver<Delivery>) {
        while let Some(delivery) = receiver.recv().await {
            if let Err(e) = self.route(&delivery) {
                error!(event = %delivery.channel, error = %e, "Delivery rejected");
            }
        }
    }

    /// Validate a delivery and invoke its listeners, oldest first.
    ///
    /// Returns the number of listeners invoked. A panicking listener is logged
    /// and counted; the remaining listeners still run.
    pub fn route(&self, delivery: &Delivery) -> Result<usize> {
        if !delivery.payload.is_empty() {
            return Err(Error::ProtocolViolation {
                event: delivery.channel.clone(),
                len: delivery.payload.len(),
            });
        }

        let event: &str = &delivery.channel;
        // Snapshot, so listeners may (un)subscribe without deadlocking.
        let Some(listeners) = self.registry.lock().listeners(event) else {
            return Ok(0);
        };
        let Some(context) = self.context.upgrade() else {
            debug!(event, "Context is gone, delivery dropped");
            return Ok(0);
        };

        if self.debug {
            debug!(event, listeners = listeners.len(), "Routing delivery");
        }
        for (idx, listener) in listeners.iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| listener.call(&context, event)));
            if result.is_err() {
                error!(event, listener = idx, "Listener panicked");
            }
        }
        Ok(listeners.len())
    }
}
