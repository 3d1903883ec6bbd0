use std::time::Duration;

use crate::internal::Backoff;

/// Broker endpoint, credentials and connection behavior for a [`Dispatcher`].
///
/// Use the builder methods to customize, or [`Default`] for a local broker.
///
/// # Examples
///
/// ```rust
/// use nudge::Config;
///
/// let config = Config::new(6379, "localhost")
///     .with_password("s3cret")
///     .with_debug(true);
/// ```
///
/// [`Dispatcher`]: crate::Dispatcher
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Broker host name or address.
    /// Default: "localhost"
    pub host: String,

    /// Broker port.
    /// Default: 6379
    pub port: u16,

    /// Optional password, sent during every connection handshake
    /// (reconnects included).
    /// Default: None
    pub password: Option<String>,

    /// Log every publish and every routed delivery at debug level.
    /// Default: false
    pub debug: bool,

    /// Delay before the first reconnect attempt. Doubles with every
    /// consecutive failure.
    /// Default: 100 ms
    pub reconnect_delay: Duration,

    /// Upper bound for the reconnect delay. Attempts themselves are unlimited.
    /// Default: 5 s
    pub max_reconnect_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            debug: false,
            reconnect_delay: Duration::from_millis(100),
            max_reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("debug", &self.debug)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .finish()
    }
}

impl Config {
    pub fn new(port: u16, host: impl Into<String>) -> Self {
        Config {
            host: host.into(),
            port,
            ..Config::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the initial reconnect delay.
    ///
    /// Values above [`max_reconnect_delay`](Config::max_reconnect_delay)
    /// are clamped to it.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    pub(crate) fn backoff(&self) -> Backoff {
        Backoff::new(self.reconnect_delay, self.max_reconnect_delay)
    }

    /// Connection URL for the Redis client, with the password percent-encoded.
    #[cfg(feature = "redis")]
    pub fn redis_url(&self) -> crate::Result<url::Url> {
        let invalid = |what: &str| {
            crate::Error::InvalidConfig(format!("{what} rejected for host '{}'", self.host))
        };

        let mut url = url::Url::parse("redis://localhost")
            .map_err(|e| crate::Error::InvalidConfig(e.to_string()))?;
        url.set_host(Some(&self.host))
            .map_err(|e| crate::Error::InvalidConfig(format!("host '{}': {e}", self.host)))?;
        url.set_port(Some(self.port))
            .map_err(|_| invalid("port"))?;
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| invalid("password"))?;
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6379);
        assert_eq!(config.password, None);
        assert!(!config.debug);
        assert_eq!(config.max_reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_builder() {
        let config = Config::new(7000, "cache.internal")
            .with_password("pw")
            .with_debug(true)
            .with_reconnect_delay(Duration::from_millis(20));
        assert_eq!(config.port, 7000);
        assert_eq!(config.host, "cache.internal");
        assert_eq!(config.password.as_deref(), Some("pw"));
        assert!(config.debug);
        assert_eq!(config.reconnect_delay, Duration::from_millis(20));
    }

    #[test]
    fn test_debug_masks_password() {
        let config = Config::default().with_password("hunter2");
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("****"));
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_url() {
        let url = Config::new(6380, "example.com").redis_url().unwrap();
        assert_eq!(url.as_str(), "redis://example.com:6380");
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_url_encodes_password() {
        let url = Config::default()
            .with_password("p@ss:word")
            .redis_url()
            .unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(6379));
        assert_eq!(url.password(), Some("p%40ss%3Aword"));
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_url_rejects_bad_host() {
        let err = Config::new(6379, "bad host").redis_url().unwrap_err();
        assert!(matches!(err, crate::Error::InvalidConfig(_)));
    }
}
