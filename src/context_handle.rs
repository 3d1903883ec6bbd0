use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    Config, Dispatch, Listener, Result,
    internal::{Connection, Registry, Router},
    transport::{Request, Role, Transport},
};

/// State owned by one attached context: its subscriber connection and its
/// listener registry. The context itself is only referenced weakly.
pub(crate) struct Attachment<C> {
    context: Weak<C>,
    registry: Arc<Mutex<Registry<C>>>,
    connection: Connection,
    debug: bool,
}

impl<C: Send + Sync + 'static> Attachment<C> {
    /// Open a dedicated subscriber connection and wire a router to it.
    pub fn open<T: Transport>(
        context: &Arc<C>,
        transport: &Arc<T>,
        config: &Config,
        cancel_token: CancellationToken,
    ) -> Self {
        let (tx, rx) = unbounded_channel();
        let connection = Connection::open(
            transport.clone(),
            Role::Subscriber,
            config.backoff(),
            Some(tx),
            cancel_token,
        );
        let registry = Arc::new(Mutex::new(Registry::default()));
        let router = Router::new(Arc::downgrade(context), registry.clone(), config.debug);
        tokio::spawn(router.run(rx));

        Self {
            context: Arc::downgrade(context),
            registry,
            connection,
            debug: config.debug,
        }
    }
}

impl<C> Attachment<C> {
    /// Whether the owning context is still alive.
    pub fn is_live(&self) -> bool {
        self.context.strong_count() > 0
    }

    /// Tear down the connection and drop every listener.
    pub fn close(&self) {
        self.connection.close();
        self.registry.lock().clear();
    }
}

/// Subscription API of an attached context.
///
/// Returned by [`Dispatcher::attach`](crate::Dispatcher::attach) and
/// [`Dispatcher::context`](crate::Dispatcher::context). Handles are cheap to
/// clone; all clones refer to the same registry and connection. Once the
/// context is detached every call on the handle is ignored.
pub struct ContextHandle<C> {
    attachment: Arc<Attachment<C>>,
}

impl<C> ContextHandle<C> {
    pub(crate) fn new(attachment: Arc<Attachment<C>>) -> Self {
        Self { attachment }
    }

    /// Register `listener` for `event` and ask the broker for the channel.
    ///
    /// The listener is appended even if already present, so subscribing it
    /// twice makes it run twice per delivery. The broker request is sent every
    /// time; the broker treats repeated subscribes as one.
    pub fn subscribe(&self, event: &str, listener: &Listener<C>) -> Dispatch {
        if event.is_empty() || !self.is_attached() {
            return Dispatch::Ignored;
        }
        // Requests are queued under the registry lock so their order matches
        // the order of registry changes.
        let mut registry = self.attachment.registry.lock();
        registry.subscribe(event, listener);
        if self.attachment.debug {
            debug!(event, "Subscribe");
        }
        self.attachment
            .connection
            .send(Request::Subscribe(Arc::from(event)));
        Dispatch::Accepted
    }

    /// Remove every registration of `listener` for `event`.
    ///
    /// The broker subscription is dropped once no listener is left for the
    /// event (or if there never was one).
    pub fn unsubscribe(&self, event: &str, listener: &Listener<C>) -> Dispatch {
        if event.is_empty() || !self.is_attached() {
            return Dispatch::Ignored;
        }
        let mut registry = self.attachment.registry.lock();
        if registry.unsubscribe(event, listener) {
            if self.attachment.debug {
                debug!(event, "Unsubscribe");
            }
            self.attachment
                .connection
                .send(Request::Unsubscribe(Arc::from(event)));
        }
        Dispatch::Accepted
    }

    /// Wait until every request issued so far through this handle has reached
    /// the broker.
    pub async fn flush(&self) -> Result<()> {
        self.attachment.connection.flush().await
    }

    pub fn is_attached(&self) -> bool {
        !self.attachment.connection.is_closed()
    }

    /// The attached context, unless it has been dropped.
    pub fn context(&self) -> Option<Arc<C>> {
        self.attachment.context.upgrade()
    }

    /// Events with at least one listener, sorted by name.
    pub fn events(&self) -> Vec<Arc<str>> {
        self.attachment.registry.lock().events()
    }
}

impl<C> Clone for ContextHandle<C> {
    fn clone(&self) -> Self {
        Self {
            attachment: self.attachment.clone(),
        }
    }
}

impl<C> PartialEq for ContextHandle<C> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.attachment, &other.attachment)
    }
}

impl<C> Eq for ContextHandle<C> {}

impl<C> std::fmt::Debug for ContextHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("connection", &self.attachment.connection.id())
            .field("attached", &self.is_attached())
            .finish()
    }
}
