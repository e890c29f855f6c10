//! HTTP side-channel registration.
//!
//! Fired on every successful open but confirmed at most once per process:
//! after the first successful call it is never repeated, even across
//! reconnects, so the server never sees duplicate records.  A failed
//! attempt leaves the client eligible again on the next open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tl_protocol::{DeviceIdentity, RegistrationBody};
use tokio::task::JoinHandle;

use crate::types::LinkError;

/// Performs one registration call and returns the response body.
#[async_trait]
pub trait Registrar: Send + Sync + 'static {
    async fn register(&self, body: &RegistrationBody) -> Result<String, LinkError>;
}

/// `POST` the registration body as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpRegistrar {
    http: Client,
    url: String,
}

impl HttpRegistrar {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LinkError> {
        let url = url.into();
        if url.is_empty() {
            return Err(LinkError::Config("register_url is required".into()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LinkError::Registration(e.to_string()))?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Registrar for HttpRegistrar {
    async fn register(&self, body: &RegistrationBody) -> Result<String, LinkError> {
        let resp = self
            .http
            .post(&self.url)
            .header("X-Client-Type", "tvlink-agent")
            .json(body)
            .send()
            .await
            .map_err(|e| LinkError::Registration(format!("POST {}: {e}", self.url)))?;

        // Any completed exchange counts; the status is only reported.
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, status = %status, "registration endpoint returned non-success status");
        }
        Ok(resp.text().await.unwrap_or_default())
    }
}

/// Once-per-process gate around a [`Registrar`].
#[derive(Clone)]
pub struct RegistrationClient {
    registrar: Arc<dyn Registrar>,
    confirmed: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
}

impl RegistrationClient {
    pub fn new(registrar: Arc<dyn Registrar>) -> Self {
        Self {
            registrar,
            confirmed: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed.load(Ordering::Acquire)
    }

    /// Start a registration attempt unless one already succeeded or is
    /// still running.  Returns the spawned task, if any.
    pub fn trigger(&self, identity: &DeviceIdentity) -> Option<JoinHandle<()>> {
        if self.is_confirmed() {
            tracing::debug!(device_id = %identity.id, "already registered, skipping");
            return None;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!(device_id = %identity.id, "registration already in flight");
            return None;
        }

        let body = identity.registration_body();
        let registrar = self.registrar.clone();
        let confirmed = self.confirmed.clone();
        let in_flight = self.in_flight.clone();

        Some(tokio::spawn(async move {
            match registrar.register(&body).await {
                Ok(response) => {
                    confirmed.store(true, Ordering::Release);
                    tracing::info!(device_id = %body.tv_id, response = %response, "device registered");
                }
                Err(e) => {
                    tracing::warn!(
                        device_id = %body.tv_id,
                        error = %e,
                        "registration failed, will retry on next connect"
                    );
                }
            }
            in_flight.store(false, Ordering::Release);
        }))
    }
}
