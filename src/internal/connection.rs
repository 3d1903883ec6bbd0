use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use tokio::{
    select,
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
        oneshot,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Backoff;
use crate::{
    Error, Result,
    transport::{Delivery, Link, Request, Role, Transport},
};

enum Command {
    Request(Request),
    Flush(oneshot::Sender<()>),
}

/// Handle to a resilient broker connection.
///
/// The connection itself lives in a background task that never gives up.
/// Reconnects wait out a capped exponential backoff, requests sent while the
/// link is down wait in the queue, and subscriptions are restored after every
/// reconnect. A request the broker refuses is logged and dropped without
/// touching the link. Transport errors never reach the caller.
///
/// Cloning yields another handle to the same connection.
#[derive(Debug, Clone)]
pub(crate) struct Connection {
    id: Uuid,
    role: Role,
    sender: UnboundedSender<Command>,
    cancel_token: CancellationToken,
}

impl Connection {
    /// Spawn the connection task. Must be called within a Tokio runtime.
    ///
    /// Deliveries received on the link are forwarded to `inbound`, if given.
    pub fn open<T: Transport>(
        transport: Arc<T>,
        role: Role,
        backoff: Backoff,
        inbound: Option<UnboundedSender<Delivery>>,
        cancel_token: CancellationToken,
    ) -> Self {
        let id = Uuid::new_v4();
        let (tx, rx) = unbounded_channel();
        let mut worker = ConnectionWorker {
            id,
            role,
            transport,
            receiver: rx,
            inbound,
            cancel_token: cancel_token.clone(),
            backoff,
            channels: HashSet::new(),
            backlog: VecDeque::new(),
        };
        tokio::spawn(async move { worker.run().await });
        Self {
            id,
            role,
            sender: tx,
            cancel_token,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a request. Returns `false` if the connection has been closed.
    pub fn send(&self, request: Request) -> bool {
        !self.is_closed() && self.sender.send(Command::Request(request)).is_ok()
    }

    /// Resolves once every request queued before this call has been executed
    /// on a live link.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.is_closed() || self.sender.send(Command::Flush(tx)).is_err() {
            return Err(Error::ConnectionClosed);
        }
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    pub fn close(&self) {
        debug!(connection = %self.id, role = %self.role, "Closing connection");
        self.cancel_token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled() || self.sender.is_closed()
    }
}

enum Served {
    Closed,
    Dropped,
}

struct ConnectionWorker<T: Transport> {
    id: Uuid,
    role: Role,
    transport: Arc<T>,
    receiver: UnboundedReceiver<Command>,
    inbound: Option<UnboundedSender<Delivery>>,
    cancel_token: CancellationToken,
    backoff: Backoff,
    channels: HashSet<Arc<str>>,
    backlog: VecDeque<Request>,
}

impl<T: Transport> ConnectionWorker<T> {
    async fn run(&mut self) {
        while let Some(mut link) = self.connect().await {
            match self.restore(&mut link).await {
                Ok(()) => {
                    self.backoff.reset();
                    match self.serve(&mut link).await {
                        Served::Closed => break,
                        Served::Dropped => {
                            warn!(connection = %self.id, role = %self.role, "Link dropped, reconnecting");
                        }
                    }
                }
                Err(e) => {
                    warn!(connection = %self.id, role = %self.role, error = %e, "Link dropped while restoring state");
                }
            }
            drop(link);
            if !self.pause().await {
                break;
            }
        }
        debug!(connection = %self.id, role = %self.role, "Connection task finished");
    }

    /// Open a link, retrying forever. `None` only when cancelled.
    async fn connect(&mut self) -> Option<T::Link> {
        loop {
            let attempt = select! {
                _ = self.cancel_token.cancelled() => return None,
                r = self.transport.open(self.role) => r,
            };
            match attempt {
                Ok(link) => {
                    info!(
                        connection = %self.id,
                        role = %self.role,
                        attempts = self.backoff.attempts(),
                        "Connected to broker"
                    );
                    return Some(link);
                }
                Err(e) => {
                    warn!(
                        connection = %self.id,
                        role = %self.role,
                        attempt = self.backoff.attempts() + 1,
                        error = %e,
                        "Broker connection failed"
                    );
                    if !self.pause().await {
                        return None;
                    }
                }
            }
        }
    }

    /// Sleep for the next backoff delay. `false` when cancelled meanwhile.
    ///
    /// The delay only resets once a link has been fully restored, so a broker
    /// that accepts connections and then drops them is throttled as well.
    async fn pause(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        debug!(
            connection = %self.id,
            delay_ms = delay.as_millis() as u64,
            "Waiting before reconnect"
        );
        select! {
            _ = self.cancel_token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Re-subscribe every active channel, then replay publishes that failed
    /// on the previous link. Only a lost link is an error here; requests the
    /// broker refuses are logged and dropped.
    async fn restore(&mut self, link: &mut T::Link) -> Result<()> {
        for channel in &self.channels {
            match link.execute(&Request::Subscribe(channel.clone())).await {
                Ok(()) => {}
                Err(e) if e.is_link_lost() => return Err(e),
                Err(e) => {
                    warn!(connection = %self.id, channel = %channel, error = %e, "Broker rejected resubscribe");
                }
            }
        }
        while let Some(request) = self.backlog.front() {
            match link.execute(request).await {
                Ok(()) => {}
                Err(e) if e.is_link_lost() => return Err(e),
                Err(e) => {
                    warn!(connection = %self.id, channel = request.channel(), error = %e, "Broker rejected replayed request, dropping it");
                }
            }
            self.backlog.pop_front();
        }
        Ok(())
    }

    async fn serve(&mut self, link: &mut T::Link) -> Served {
        loop {
            select! {
                _ = self.cancel_token.cancelled() => return Served::Closed,
                cmd = self.receiver.recv() => match cmd {
                    None => return Served::Closed,
                    Some(Command::Flush(ack)) => {
                        let _ = ack.send(());
                    }
                    Some(Command::Request(request)) => {
                        self.track(&request);
                        match link.execute(&request).await {
                            Ok(()) => {}
                            Err(e) if e.is_link_lost() => {
                                warn!(connection = %self.id, role = %self.role, channel = request.channel(), error = %e, "Broker request failed");
                                if matches!(request, Request::Publish(_)) {
                                    self.backlog.push_back(request);
                                }
                                return Served::Dropped;
                            }
                            Err(e) => {
                                warn!(connection = %self.id, role = %self.role, channel = request.channel(), error = %e, "Broker rejected request, dropping it");
                            }
                        }
                    }
                },
                delivery = link.next_delivery() => match delivery {
                    None => return Served::Dropped,
                    Some(delivery) => self.forward(delivery),
                }
            }
        }
    }

    /// Keep the channel set in sync so it can be restored after a reconnect.
    fn track(&mut self, request: &Request) {
        match request {
            Request::Subscribe(channel) => {
                self.channels.insert(channel.clone());
            }
            Request::Unsubscribe(channel) => {
                self.channels.remove(channel);
            }
            Request::Publish(_) => {}
        }
    }

    fn forward(&mut self, delivery: Delivery) {
        match &self.inbound {
            Some(inbound) => {
                if inbound.send(delivery).is_err() {
                    debug!(connection = %self.id, "Inbound receiver gone, dropping delivery");
                }
            }
            None => {
                debug!(connection = %self.id, channel = %delivery.channel, "Unexpected delivery dropped");
            }
        }
    }
}
