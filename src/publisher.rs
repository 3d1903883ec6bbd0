use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    Config, Dispatch, Result,
    internal::Connection,
    transport::{Request, Role, Transport},
};

/// Sends signals cluster-wide over the dispatcher's shared publisher connection.
///
/// Obtained from [`Dispatcher::publisher`](crate::Dispatcher::publisher).
/// Clones share the one connection. Publishing is fire-and-forget: there is
/// no acknowledgment and no retry beyond what the connection does while the
/// broker is unreachable.
#[derive(Debug, Clone)]
pub struct Publisher {
    connection: Connection,
    debug: bool,
}

impl Publisher {
    pub(crate) fn open<T: Transport>(
        transport: &Arc<T>,
        config: &Config,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            connection: Connection::open(
                transport.clone(),
                Role::Publisher,
                config.backoff(),
                None,
                cancel_token,
            ),
            debug: config.debug,
        }
    }

    /// Publish `event` with an empty payload. An empty event name is ignored.
    pub fn publish(&self, event: &str) -> Dispatch {
        if event.is_empty() {
            return Dispatch::Ignored;
        }
        if self.debug {
            debug!(event, "Publish");
        }
        if self.connection.send(Request::Publish(Arc::from(event))) {
            Dispatch::Accepted
        } else {
            Dispatch::Ignored
        }
    }

    /// Wait until every event published so far has reached the broker.
    pub async fn flush(&self) -> Result<()> {
        self.connection.flush().await
    }

    pub(crate) fn close(&self) {
        self.connection.close();
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }
}
