use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    Config, ContextHandle, Dispatch, Publisher, Result, context_handle::Attachment,
    transport::Transport,
};

/// Identity of a context: the address of its `Arc` allocation.
///
/// The side table keeps a `Weak` to every attached context, which pins the
/// allocation, so an address cannot be reused while its entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ContextId(usize);

impl ContextId {
    fn of<C>(context: &Arc<C>) -> Self {
        Self(Arc::as_ptr(context) as usize)
    }
}

/// Owns the shared publisher connection and the attached contexts.
///
/// - `start(config)` connects the publisher (Redis) and returns immediately.
/// - `attach(&ctx)` gives a context its own subscriber connection and returns
///   a [`ContextHandle`] to subscribe with. Attaching twice is a no-op.
/// - `publish(event)` signals every matching subscription in the cluster.
/// - `detach(&ctx)` tears the context's connection and registry down.
///
/// Connections reconnect on their own and queue requests while the broker is
/// away, so none of the calls block or fail because of the broker.
/// All calls must happen within a Tokio runtime.
///
/// See also: [`Config`], [`Listener`](crate::Listener), [`Transport`].
pub struct Dispatcher<C, T: Transport> {
    config: Arc<Config>,
    transport: Arc<T>,
    publisher: Publisher,
    contexts: Mutex<HashMap<ContextId, Arc<Attachment<C>>>>,
    cancel_token: CancellationToken,
}

#[cfg(feature = "redis")]
impl<C: Send + Sync + 'static> Dispatcher<C, crate::transport::RedisTransport> {
    /// Connect to the Redis broker described by `config`.
    ///
    /// Returns without waiting for the broker. Only fails on an invalid
    /// configuration; an unreachable broker is retried in the background.
    /// Must be called within a Tokio runtime.
    pub fn start(config: Config) -> Result<Self> {
        let transport = crate::transport::RedisTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<C: Send + Sync + 'static, T: Transport> Dispatcher<C, T> {
    /// Build a dispatcher over any transport. Must be called within a Tokio
    /// runtime.
    pub fn with_transport(config: Config, transport: T) -> Self {
        let config = Arc::new(config);
        let transport = Arc::new(transport);
        let cancel_token = CancellationToken::new();
        let publisher = Publisher::open(&transport, &config, cancel_token.child_token());
        info!(host = %config.host, port = config.port, "Dispatcher started");
        Self {
            config,
            transport,
            publisher,
            contexts: Mutex::new(HashMap::new()),
            cancel_token,
        }
    }

    /// Attach `context`, opening its dedicated subscriber connection.
    ///
    /// If the context is already attached, the existing handle is returned and
    /// nothing new is created. The check and the insert happen under one lock,
    /// so concurrent calls for the same context cannot both create state.
    pub fn attach(&self, context: &Arc<C>) -> ContextHandle<C> {
        let id = ContextId::of(context);
        let mut contexts = self.contexts.lock();
        if let Some(existing) = contexts.get(&id) {
            return ContextHandle::new(existing.clone());
        }

        contexts.retain(|_, attachment| {
            if !attachment.is_live() {
                debug!("Reaping attachment of a dropped context");
                attachment.close();
            }
            attachment.is_live()
        });

        let attachment = Arc::new(Attachment::open(
            context,
            &self.transport,
            &self.config,
            self.cancel_token.child_token(),
        ));
        contexts.insert(id, attachment.clone());
        debug!(attached = contexts.len(), "Context attached");
        ContextHandle::new(attachment)
    }

    pub fn attached(&self, context: &Arc<C>) -> bool {
        self.contexts.lock().contains_key(&ContextId::of(context))
    }

    /// Handle of an attached context.
    pub fn context(&self, context: &Arc<C>) -> Option<ContextHandle<C>> {
        self.contexts
            .lock()
            .get(&ContextId::of(context))
            .map(|a| ContextHandle::new(a.clone()))
    }

    /// Detach `context`: close its connection and drop its listeners.
    /// Outstanding handles stop working. No-op if not attached.
    pub fn detach(&self, context: &Arc<C>) {
        let removed = self.contexts.lock().remove(&ContextId::of(context));
        if let Some(attachment) = removed {
            attachment.close();
            debug!("Context detached");
        }
    }

    /// Publish `event` cluster-wide. An empty event name is ignored.
    pub fn publish(&self, event: &str) -> Dispatch {
        self.publisher.publish(event)
    }

    /// A cloneable publishing handle sharing this dispatcher's connection.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Wait until every event published so far has reached the broker.
    pub async fn flush(&self) -> Result<()> {
        self.publisher.flush().await
    }

    /// Detach every context and close the publisher connection.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.contexts.lock().drain().map(|(_, a)| a).collect();
        for attachment in &drained {
            attachment.close();
        }
        self.publisher.close();
        self.cancel_token.cancel();
        info!(detached = drained.len(), "Dispatcher shut down");
    }

    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    pub fn transport(&self) -> &T {
        self.transport.as_ref()
    }
}

impl<C, T: Transport> Drop for Dispatcher<C, T> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl<C, T: Transport> std::fmt::Debug for Dispatcher<C, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("attached", &self.contexts.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, Role};

    struct Ctx;

    #[test]
    fn test_context_id_is_allocation_identity() {
        let a = Arc::new(Ctx);
        let b = Arc::new(Ctx);
        assert_eq!(ContextId::of(&a), ContextId::of(&a.clone()));
        assert_ne!(ContextId::of(&a), ContextId::of(&b));
    }

    #[tokio::test]
    async fn test_dropped_context_is_reaped_on_attach() {
        let transport = MemoryTransport::new();
        let dispatcher = Dispatcher::<Ctx, _>::with_transport(Config::default(), transport.clone());

        let gone = Arc::new(Ctx);
        dispatcher.attach(&gone).flush().await.unwrap();
        drop(gone);

        let kept = Arc::new(Ctx);
        let handle = dispatcher.attach(&kept);
        handle.flush().await.unwrap();

        assert_eq!(dispatcher.contexts.lock().len(), 1);
        assert!(dispatcher.attached(&kept));
        for _ in 0..100 {
            if transport.live_links(Role::Subscriber) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.live_links(Role::Subscriber), 1);
    }

    #[cfg(feature = "redis")]
    #[tokio::test]
    async fn test_start_does_not_wait_for_broker() {
        let dispatcher =
            Dispatcher::<Ctx, crate::transport::RedisTransport>::start(Config::new(1, "127.0.0.1"))
                .unwrap();
        assert!(dispatcher.publish("x").is_accepted());
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn test_drop_closes_connections() {
        let dispatcher =
            Dispatcher::<Ctx, _>::with_transport(Config::default(), MemoryTransport::new());
        let ctx = Arc::new(Ctx);
        let handle = dispatcher.attach(&ctx);
        let publisher = dispatcher.publisher();
        drop(dispatcher);
        assert!(!handle.is_attached());
        assert!(publisher.is_closed());
        assert!(publisher.publish("x").is_ignored());
    }
}
