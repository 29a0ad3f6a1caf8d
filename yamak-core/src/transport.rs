//! Delivery of event payloads to the collector
//!
//! Two modes:
//! - [`Transport::send`]: a normal fire-and-forget POST. The optional
//!   callback fires once the exchange reaches a terminal state.
//! - [`Transport::send_beacon`]: teardown delivery. Queues the payload and
//!   returns immediately; nothing waits on a response and no callback runs.
//!
//! Neither mode reports errors to the caller. Failed deliveries are logged
//! and dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use tokio::runtime::Handle;

use crate::config::TransportConfig;
use crate::error::Result;
use crate::types::EventPayload;

/// Terminal state of a [`Transport::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The collector answered with this status code
    Completed { status: u16 },
    /// The request never completed
    Failed { reason: String },
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Completed { status } if (200..300).contains(status))
    }
}

/// Completion callback for [`Transport::send`]
#[derive(Clone)]
pub struct SendCallback(Arc<dyn Fn(SendOutcome) + Send + Sync>);

impl SendCallback {
    pub fn new(f: impl Fn(SendOutcome) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, outcome: SendOutcome) {
        (self.0)(outcome)
    }
}

impl fmt::Debug for SendCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendCallback")
    }
}

/// Sends JSON bodies to the collector
pub trait Transport: Send + Sync {
    /// Fire-and-forget POST of `body` to `url`
    fn send(&self, url: &str, body: String, on_complete: Option<SendCallback>);

    /// Best-effort delivery while the page is going away.
    ///
    /// Returns whether the payload was queued.
    fn send_beacon(&self, url: &str, body: String) -> bool;

    /// Whether [`Transport::send_beacon`] is available
    fn supports_beacon(&self) -> bool {
        true
    }
}

// ============================================
// HttpTransport
// ============================================

/// reqwest-backed transport. Requests run as tasks on the ambient tokio
/// runtime; without one, payloads are dropped.
#[derive(Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self { http_client })
    }

    fn spawn_post(&self, url: &str, body: String, on_complete: Option<SendCallback>) -> bool {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(url = %url, "No async runtime, dropping event");
            if let Some(callback) = on_complete {
                callback.call(SendOutcome::Failed {
                    reason: "no async runtime".to_string(),
                });
            }
            return false;
        };

        let client = self.http_client.clone();
        let url = url.to_string();
        handle.spawn(async move {
            let outcome = match client.post(&url).body(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        tracing::debug!(url = %url, status = %status, "Collector rejected event");
                    }
                    SendOutcome::Completed {
                        status: status.as_u16(),
                    }
                }
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "Failed to send event");
                    SendOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            if let Some(callback) = on_complete {
                callback.call(outcome);
            }
        });
        true
    }
}

impl Transport for HttpTransport {
    fn send(&self, url: &str, body: String, on_complete: Option<SendCallback>) {
        self.spawn_post(url, body, on_complete);
    }

    fn send_beacon(&self, url: &str, body: String) -> bool {
        self.spawn_post(url, body, None)
    }
}

// ============================================
// MemoryTransport
// ============================================

/// How a payload was handed to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Request,
    Beacon,
}

/// A payload captured by [`MemoryTransport`]
#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub mode: DeliveryMode,
    pub url: String,
    pub body: Value,
    pub sent_at: DateTime<Utc>,
}

impl RecordedSend {
    /// Decode the body as an [`EventPayload`]
    pub fn payload(&self) -> Option<EventPayload> {
        serde_json::from_value(self.body.clone()).ok()
    }
}

/// Records payloads instead of sending them.
///
/// Used by tests and by `yamak --dry-run`. Completion callbacks fire
/// immediately with status 200.
pub struct MemoryTransport {
    sends: Mutex<Vec<RecordedSend>>,
    beacon: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            sends: Mutex::new(Vec::new()),
            beacon: true,
        }
    }

    /// A transport whose host has no beacon support
    pub fn without_beacon() -> Self {
        Self {
            sends: Mutex::new(Vec::new()),
            beacon: false,
        }
    }

    pub fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().clone()
    }

    /// Decoded payloads, in send order
    pub fn payloads(&self) -> Vec<EventPayload> {
        self.sends
            .lock()
            .iter()
            .filter_map(RecordedSend::payload)
            .collect()
    }

    pub fn take(&self) -> Vec<RecordedSend> {
        std::mem::take(&mut *self.sends.lock())
    }

    pub fn len(&self) -> usize {
        self.sends.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sends.lock().is_empty()
    }

    fn record(&self, mode: DeliveryMode, url: &str, body: &str) {
        let body = serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));
        self.sends.lock().push(RecordedSend {
            mode,
            url: url.to_string(),
            body,
            sent_at: Utc::now(),
        });
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, url: &str, body: String, on_complete: Option<SendCallback>) {
        self.record(DeliveryMode::Request, url, &body);
        if let Some(callback) = on_complete {
            callback.call(SendOutcome::Completed { status: 200 });
        }
    }

    fn send_beacon(&self, url: &str, body: String) -> bool {
        if !self.beacon {
            return false;
        }
        self.record(DeliveryMode::Beacon, url, &body);
        true
    }

    fn supports_beacon(&self) -> bool {
        self.beacon
    }
}
