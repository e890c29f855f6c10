//! Builder pattern for constructing a [`ConnectionManager`].

use std::sync::Arc;
use std::time::Duration;

use tl_protocol::{DeviceIdentity, MAX_INBOUND_BYTES};

use crate::executor::CommandExecutor;
use crate::health::Heartbeat;
use crate::manager::ConnectionManager;
use crate::reconnect::{BackoffState, ReconnectBackoff};
use crate::registration::{HttpRegistrar, Registrar, RegistrationClient};
use crate::router::MessageRouter;
use crate::transport::{Connector, WsConnector, DEFAULT_CONNECT_TIMEOUT};
use crate::types::{ExternalResources, LinkError};

/// Fluent builder for [`ConnectionManager`].
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use tl_link::{LinkBuilder, DeviceIdentity, CommandExecutor};
/// # fn executor() -> Arc<dyn CommandExecutor> { unimplemented!() }
/// let manager = LinkBuilder::new()
///     .endpoint("wss://control.example.com/ws")
///     .register_url("https://control.example.com/api/tv/register")
///     .identity(DeviceIdentity {
///         id: "TV-ABCD1234".into(),
///         model: "UA43T6500".into(),
///         brand: "Samsung".into(),
///         ip: "10.0.0.12".into(),
///         group_id: "BR-07".into(),
///     })
///     .executor(executor())
///     .ping_interval(std::time::Duration::from_secs(30))
///     .build()
///     .unwrap();
/// ```
pub struct LinkBuilder {
    endpoint: String,
    register_url: Option<String>,
    register_timeout: Duration,
    connect_timeout: Duration,
    identity: Option<DeviceIdentity>,
    ping_interval: Duration,
    health_check_multiplier: u32,
    stale_multiplier: u32,
    backoff: ReconnectBackoff,
    max_inbound_bytes: usize,
    connector: Option<Arc<dyn Connector>>,
    registrar: Option<Arc<dyn Registrar>>,
    executor: Option<Arc<dyn CommandExecutor>>,
    resources: Option<Box<dyn ExternalResources>>,
}

impl LinkBuilder {
    pub fn new() -> Self {
        Self {
            endpoint: String::new(),
            register_url: None,
            register_timeout: Duration::from_secs(10),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            identity: None,
            ping_interval: Duration::from_secs(30),
            health_check_multiplier: 2,
            stale_multiplier: 3,
            backoff: ReconnectBackoff::default(),
            max_inbound_bytes: MAX_INBOUND_BYTES,
            connector: None,
            registrar: None,
            executor: None,
            resources: None,
        }
    }

    // ── Required ─────────────────────────────────────────────────────

    /// WebSocket endpoint (e.g. `wss://control.example.com/ws`).
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    pub fn identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// HTTP registration endpoint.  Ignored when [`registrar`](Self::registrar)
    /// is set.
    pub fn register_url(mut self, url: impl Into<String>) -> Self {
        self.register_url = Some(url.into());
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    pub fn register_timeout(mut self, d: Duration) -> Self {
        self.register_timeout = d;
        self
    }

    /// Bound on one connection attempt's handshake (default 10s).  Ignored
    /// when [`connector`](Self::connector) is set.
    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }

    /// Override the ping interval (default 30s).
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }

    /// Health check runs every `n × ping_interval` (default 2).
    pub fn health_check_multiplier(mut self, n: u32) -> Self {
        self.health_check_multiplier = n;
        self
    }

    /// Link is stale after `n × ping_interval` without activity (default 3).
    pub fn stale_multiplier(mut self, n: u32) -> Self {
        self.stale_multiplier = n;
        self
    }

    /// Override the reconnect backoff policy.
    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.backoff = cfg;
        self
    }

    /// Maximum inbound frame size (default 64 KB).
    pub fn max_inbound_bytes(mut self, n: usize) -> Self {
        self.max_inbound_bytes = n;
        self
    }

    // ── Collaborators ────────────────────────────────────────────────

    /// Replace the default WebSocket connector.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the default HTTP registrar.
    pub fn registrar(mut self, registrar: Arc<dyn Registrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Resources released once at teardown (process lock, wake-lock, …).
    pub fn resources(mut self, resources: Box<dyn ExternalResources>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Build the [`ConnectionManager`].
    pub fn build(self) -> Result<ConnectionManager, LinkError> {
        if self.endpoint.is_empty() {
            return Err(LinkError::Config("endpoint is required".into()));
        }
        if self.ping_interval.is_zero() {
            return Err(LinkError::Config("ping_interval must be non-zero".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(LinkError::Config("connect_timeout must be non-zero".into()));
        }
        if self.backoff.min_delay > self.backoff.max_delay {
            return Err(LinkError::Config(
                "backoff min_delay must not exceed max_delay".into(),
            ));
        }
        let identity = self
            .identity
            .ok_or_else(|| LinkError::Config("identity is required".into()))?;
        let executor = self
            .executor
            .ok_or_else(|| LinkError::Config("executor is required".into()))?;
        let registrar: Arc<dyn Registrar> = match (self.registrar, self.register_url) {
            (Some(r), _) => r,
            (None, Some(url)) => Arc::new(HttpRegistrar::new(url, self.register_timeout)?),
            (None, None) => {
                return Err(LinkError::Config(
                    "register_url or registrar is required".into(),
                ))
            }
        };
        let connect_timeout = self.connect_timeout;
        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(WsConnector::default().with_connect_timeout(connect_timeout))
        });

        let identity = Arc::new(identity);
        let router = MessageRouter::new(identity.clone(), executor, self.max_inbound_bytes);

        Ok(ConnectionManager::new(
            self.endpoint,
            identity,
            connector,
            router,
            RegistrationClient::new(registrar),
            self.resources,
            BackoffState::new(self.backoff),
            Heartbeat::new(
                self.ping_interval,
                self.health_check_multiplier,
                self.stale_multiplier,
            ),
        ))
    }
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tl_protocol::KeyCode;

    use super::*;
    use crate::types::{ConnectionState, ExecError};

    struct NullExecutor;

    #[async_trait::async_trait]
    impl CommandExecutor for NullExecutor {
        async fn execute(&self, _code: KeyCode) -> Result<(), ExecError> {
            Ok(())
        }
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            id: "TV-1".into(),
            model: "M".into(),
            brand: "B".into(),
            ip: "0.0.0.0".into(),
            group_id: "G".into(),
        }
    }

    fn complete() -> LinkBuilder {
        LinkBuilder::new()
            .endpoint("ws://localhost:9/ws")
            .register_url("http://localhost:9/register")
            .identity(identity())
            .executor(Arc::new(NullExecutor))
    }

    #[test]
    fn builds_when_complete() {
        let manager = complete().build().unwrap();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.attempts(), 0);
        assert!(!manager.is_registered());
    }

    #[test]
    fn missing_endpoint_rejected() {
        let err = complete().endpoint("").build().err().unwrap();
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn missing_identity_rejected() {
        let err = LinkBuilder::new()
            .endpoint("ws://x")
            .register_url("http://x")
            .executor(Arc::new(NullExecutor))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("identity"));
    }

    #[test]
    fn missing_registration_rejected() {
        let err = LinkBuilder::new()
            .endpoint("ws://x")
            .identity(identity())
            .executor(Arc::new(NullExecutor))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("register_url"));
    }

    #[test]
    fn inverted_backoff_rejected() {
        let err = complete()
            .reconnect_backoff(ReconnectBackoff {
                min_delay: Duration::from_secs(10),
                max_delay: Duration::from_secs(1),
                max_attempts: 0,
            })
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("min_delay"));
    }

    #[test]
    fn zero_ping_interval_rejected() {
        assert!(complete().ping_interval(Duration::ZERO).build().is_err());
    }

    #[test]
    fn zero_connect_timeout_rejected() {
        let err = complete()
            .connect_timeout(Duration::ZERO)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("connect_timeout"));
    }
}
