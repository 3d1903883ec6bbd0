#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use nudge::{
    Config, ContextHandle, Dispatcher, Listener, Publisher,
    transport::MemoryTransport,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

pub const SETTLE: &str = "test:settle";

#[derive(Debug)]
pub struct Restaurant {
    pub name: &'static str,
}

impl Restaurant {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self { name })
    }
}

/// (listener tag, receiving context, event)
pub type Call = (&'static str, &'static str, String);

pub type TestDispatcher = Dispatcher<Restaurant, MemoryTransport>;

pub struct Harness {
    pub transport: MemoryTransport,
    pub dispatcher: TestDispatcher,
    tx: UnboundedSender<Call>,
    rx: UnboundedReceiver<Call>,
}

impl Harness {
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let transport = MemoryTransport::new();
        let dispatcher = Self::process(&transport);
        let (tx, rx) = unbounded_channel();
        Self {
            transport,
            dispatcher,
            tx,
            rx,
        }
    }

    /// Another dispatcher on the same broker, standing in for another process.
    pub fn process(transport: &MemoryTransport) -> TestDispatcher {
        let config = Config::new(6379, "localhost")
            .with_debug(true)
            .with_reconnect_delay(Duration::from_millis(10))
            .with_max_reconnect_delay(Duration::from_millis(200));
        Dispatcher::with_transport(config, transport.clone())
    }

    pub fn listener(&self, tag: &'static str) -> Listener<Restaurant> {
        let tx = self.tx.clone();
        Listener::new(move |ctx: &Restaurant, event: &str| {
            let _ = tx.send((tag, ctx.name, event.to_string()));
        })
    }

    /// Attach with a settle listener, and wait until the broker knows about it.
    pub async fn attach(&self, ctx: &Arc<Restaurant>) -> ContextHandle<Restaurant> {
        let handle = self.dispatcher.attach(ctx);
        handle.subscribe(SETTLE, &self.listener(SETTLE));
        handle.flush().await.unwrap();
        handle
    }

    /// Publish `event` through `publisher`, then a settle signal, and collect
    /// every call made until `contexts` settle signals came back. Deliveries
    /// on one link are routed in order, so nothing from `event` can arrive
    /// after its context's settle signal.
    pub async fn publish_and_settle(
        &mut self,
        publisher: &Publisher,
        event: &str,
        contexts: usize,
    ) -> Vec<Call> {
        publisher.publish(event);
        publisher.publish(SETTLE);
        publisher.flush().await.unwrap();
        self.settle(contexts).await
    }

    pub async fn settle(&mut self, contexts: usize) -> Vec<Call> {
        let mut calls = Vec::new();
        let mut settled = 0;
        while settled < contexts {
            let call = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
                .await
                .expect("settle signal not delivered")
                .expect("listener channel closed");
            if call.0 == SETTLE {
                settled += 1;
            } else {
                calls.push(call);
            }
        }
        calls
    }

    pub async fn settle_one(&mut self, publisher: &Publisher, event: &str) -> Vec<Call> {
        self.publish_and_settle(publisher, event, 1).await
    }
}

pub fn call(tag: &'static str, ctx: &'static str, event: &str) -> Call {
    (tag, ctx, event.to_string())
}

/// Poll `check` until it holds, yielding to the runtime in between.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..1000 {
        if check() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    check()
}
