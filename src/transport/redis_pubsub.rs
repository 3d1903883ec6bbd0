use futures_util::StreamExt;
use redis::{
    Client,
    aio::{MultiplexedConnection, PubSubSink, PubSubStream},
};
use tracing::debug;

use super::{Delivery, Link, Request, Role, Transport};
use crate::{Config, Error, Result};

/// Redis-backed transport.
///
/// Publisher links use a multiplexed connection and issue `PUBLISH <event> ""`.
/// Subscriber links use a dedicated pub/sub connection. The password, when
/// configured, travels in the connection URL, so the client authenticates as
/// part of every handshake.
#[derive(Debug, Clone)]
pub struct RedisTransport {
    client: Client,
}

impl RedisTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let url = config.redis_url()?;
        let client = Client::open(url.as_str())?;
        Ok(Self { client })
    }
}

impl Transport for RedisTransport {
    type Link = RedisLink;

    async fn open(&self, role: Role) -> Result<RedisLink> {
        let link = match role {
            Role::Publisher => {
                RedisLink::Publisher(self.client.get_multiplexed_async_connection().await?)
            }
            Role::Subscriber => {
                let (sink, stream) = self.client.get_async_pubsub().await?.split();
                RedisLink::Subscriber { sink, stream }
            }
        };
        debug!(%role, "Redis link opened");
        Ok(link)
    }
}

pub enum RedisLink {
    Publisher(MultiplexedConnection),
    Subscriber {
        sink: PubSubSink,
        stream: PubSubStream,
    },
}

impl std::fmt::Debug for RedisLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RedisLink({})", self.role())
    }
}

impl RedisLink {
    pub fn role(&self) -> Role {
        match self {
            RedisLink::Publisher(_) => Role::Publisher,
            RedisLink::Subscriber { .. } => Role::Subscriber,
        }
    }
}

impl Link for RedisLink {
    async fn execute(&mut self, request: &Request) -> Result<()> {
        match (self, request) {
            (RedisLink::Publisher(conn), Request::Publish(channel)) => {
                redis::cmd("PUBLISH")
                    .arg(&**channel)
                    .arg("")
                    .query_async::<i64>(conn)
                    .await?;
            }
            (RedisLink::Subscriber { sink, .. }, Request::Subscribe(channel)) => {
                sink.subscribe(&**channel).await?;
            }
            (RedisLink::Subscriber { sink, .. }, Request::Unsubscribe(channel)) => {
                sink.unsubscribe(&**channel).await?;
            }
            (link, _) => return Err(Error::Unsupported(link.role())),
        }
        Ok(())
    }

    async fn next_delivery(&mut self) -> Option<Delivery> {
        match self {
            RedisLink::Subscriber { stream, .. } => {
                let msg = stream.next().await?;
                Some(Delivery::new(
                    msg.get_channel_name(),
                    msg.get_payload_bytes(),
                ))
            }
            RedisLink::Publisher(_) => std::future::pending().await,
        }
    }
}
