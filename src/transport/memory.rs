//! In-process broker for single-process deployments and tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use super::{Delivery, Link, Request, Role, Transport};
use crate::{Error, Result};

/// A broker living in the current process.
///
/// Cloning yields another handle to the same broker, so a test can keep one
/// handle for inspection and hand another to a [`Dispatcher`].
///
/// The broker can be taken offline with [`set_online`](MemoryTransport::set_online):
/// every live link drops and new links are refused until it comes back.
///
/// The most recent messages and requests are kept for inspection, up to
/// [`DEFAULT_HISTORY`] entries each unless set with
/// [`with_history`](MemoryTransport::with_history).
///
/// [`Dispatcher`]: crate::Dispatcher
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryBroker>>,
}

/// Entries kept in each inspection log by default.
pub const DEFAULT_HISTORY: usize = 1024;

#[derive(Debug)]
struct MemoryBroker {
    online: bool,
    last_id: u64,
    links: HashMap<u64, LinkState>,
    rejected: HashSet<Arc<str>>,
    history: usize,
    published: VecDeque<Delivery>,
    requests: VecDeque<Request>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self {
            online: true,
            last_id: 0,
            links: HashMap::new(),
            rejected: HashSet::new(),
            history: DEFAULT_HISTORY,
            published: VecDeque::new(),
            requests: VecDeque::new(),
        }
    }
}

#[derive(Debug)]
struct LinkState {
    role: Role,
    channels: HashSet<Arc<str>>,
    sender: UnboundedSender<Delivery>,
}

impl MemoryBroker {
    fn fan_out(&mut self, delivery: Delivery) -> usize {
        let mut receivers = 0;
        for link in self.links.values() {
            if link.channels.contains(&delivery.channel)
                && link.sender.send(delivery.clone()).is_ok()
            {
                receivers += 1;
            }
        }
        record(&mut self.published, delivery, self.history);
        receivers
    }
}

fn record<E>(log: &mut VecDeque<E>, entry: E, capacity: usize) {
    if capacity == 0 {
        return;
    }
    if log.len() == capacity {
        log.pop_front();
    }
    log.push_back(entry);
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker keeping at most `capacity` entries in each inspection log.
    /// Zero disables both logs.
    pub fn with_history(capacity: usize) -> Self {
        let transport = Self::default();
        transport.inner.lock().history = capacity;
        transport
    }

    /// Take the broker offline (dropping every live link) or bring it back.
    pub fn set_online(&self, online: bool) {
        let mut broker = self.inner.lock();
        broker.online = online;
        if !online {
            broker.links.clear();
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.lock().online
    }

    /// Deliver a raw message to every link subscribed to `channel`, bypassing
    /// the publish path. Returns the number of receiving links.
    pub fn inject(&self, channel: &str, payload: &[u8]) -> usize {
        self.inner.lock().fan_out(Delivery::new(channel, payload))
    }

    /// Number of live links with the given role.
    pub fn live_links(&self, role: Role) -> usize {
        self.inner
            .lock()
            .links
            .values()
            .filter(|l| l.role == role)
            .count()
    }

    /// Number of live links subscribed to `channel`.
    pub fn subscribers(&self, channel: &str) -> usize {
        self.inner
            .lock()
            .links
            .values()
            .filter(|l| l.channels.contains(channel))
            .count()
    }

    /// Refuse every further request on `channel`, the way a broker denies a
    /// command it has no permission for. Links stay up.
    pub fn reject(&self, channel: &str) {
        self.inner.lock().rejected.insert(Arc::from(channel));
    }

    /// The most recent messages that went through the broker, oldest first.
    pub fn published(&self) -> Vec<Delivery> {
        self.inner.lock().published.iter().cloned().collect()
    }

    /// The most recent requests the broker executed, oldest first. Rejected
    /// requests are not included.
    pub fn requests(&self) -> Vec<Request> {
        self.inner.lock().requests.iter().cloned().collect()
    }
}

impl Transport for MemoryTransport {
    type Link = MemoryLink;

    async fn open(&self, role: Role) -> Result<MemoryLink> {
        let mut broker = self.inner.lock();
        if !broker.online {
            return Err(Error::Disconnected(Arc::from("memory broker is offline")));
        }
        broker.last_id += 1;
        let id = broker.last_id;
        let (tx, rx) = unbounded_channel();
        broker.links.insert(
            id,
            LinkState {
                role,
                channels: HashSet::new(),
                sender: tx,
            },
        );
        Ok(MemoryLink {
            id,
            broker: self.inner.clone(),
            receiver: rx,
        })
    }
}

#[derive(Debug)]
pub struct MemoryLink {
    id: u64,
    broker: Arc<Mutex<MemoryBroker>>,
    receiver: UnboundedReceiver<Delivery>,
}

impl Link for MemoryLink {
    async fn execute(&mut self, request: &Request) -> Result<()> {
        let mut broker = self.broker.lock();
        if !broker.links.contains_key(&self.id) {
            return Err(Error::Disconnected(Arc::from("memory link dropped")));
        }
        if broker.rejected.contains(request.channel()) {
            return Err(Error::Rejected {
                channel: Arc::from(request.channel()),
                reason: Arc::from("channel is rejected by the broker"),
            });
        }
        let history = broker.history;
        record(&mut broker.requests, request.clone(), history);
        match request {
            Request::Publish(channel) => {
                broker.fan_out(Delivery::signal(channel.clone()));
            }
            Request::Subscribe(channel) => {
                if let Some(link) = broker.links.get_mut(&self.id) {
                    link.channels.insert(channel.clone());
                }
            }
            Request::Unsubscribe(channel) => {
                if let Some(link) = broker.links.get_mut(&self.id) {
                    link.channels.remove(channel);
                }
            }
        }
        Ok(())
    }

    async fn next_delivery(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.broker.lock().links.remove(&self.id);
    }
}
