//! Two "processes" sharing one Redis: one watches a restaurant, the other
//! announces a change. Run a local Redis on 6379, then:
//!
//! ```sh
//! cargo run --example restaurant
//! ```

use std::{sync::Arc, time::Duration};

use nudge::{Config, Dispatcher, Listener, Result, transport::RedisTransport};

struct Restaurant {
    id: u32,
}

impl Restaurant {
    fn reload(&self, event: &str) {
        // Signals carry nothing: fetch the authoritative state here.
        println!("restaurant {} got '{event}', reloading", self.id);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = Config::new(6379, "localhost").with_debug(true);
    let watcher = Dispatcher::<Restaurant, RedisTransport>::start(config.clone())?;
    let announcer = Dispatcher::<Restaurant, RedisTransport>::start(config)?;

    let ctx = Arc::new(Restaurant { id: 42 });
    let handle = watcher.attach(&ctx);
    let on_change = Listener::new(|r: &Restaurant, event: &str| r.reload(event));
    handle.subscribe("change:restaurant", &on_change);
    handle.flush().await?;

    announcer.publish("change:restaurant");
    announcer.flush().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    handle.unsubscribe("change:restaurant", &on_change);
    watcher.detach(&ctx);
    watcher.shutdown();
    announcer.shutdown();
    Ok(())
}
