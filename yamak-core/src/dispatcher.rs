//! Event dispatch
//!
//! [`EventDispatcher`] turns a tracked event into an [`EventPayload`] and
//! hands it to the [`Transport`]. Along the way it drops events when
//! tracking is disabled, deduplicates unique events for the lifetime of the
//! session, and suppresses page views on excluded paths.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::TrackerOptions;
use crate::error::Result;
use crate::host::Host;
use crate::matcher::PathExcluder;
use crate::props;
use crate::transport::Transport;
use crate::types::{EventPayload, Properties, TrackOptions, TrackOutcome, PAGE_VIEWS_EVENT};

/// Computes the dedup key of a unique event
pub trait UniqueKeyPolicy: Send + Sync {
    fn key(&self, event: &str, options: &TrackOptions) -> String;
}

/// Keys on the event name plus its complete options, property bag included.
/// Two events differing in any property are both sent.
///
/// The key is a SHA-256 hex digest of the JSON encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerializedOptionsKey;

#[derive(Serialize)]
struct KeyInput<'a> {
    event: &'a str,
    options: &'a TrackOptions,
}

impl UniqueKeyPolicy for SerializedOptionsKey {
    fn key(&self, event: &str, options: &TrackOptions) -> String {
        let encoded = match serde_json::to_vec(&KeyInput { event, options }) {
            Ok(bytes) => bytes,
            Err(_) => event.as_bytes().to_vec(),
        };
        hex::encode(Sha256::digest(&encoded))
    }
}

/// Keys on the event name alone
#[derive(Debug, Default, Clone, Copy)]
pub struct EventNameKey;

impl UniqueKeyPolicy for EventNameKey {
    fn key(&self, event: &str, _options: &TrackOptions) -> String {
        event.to_string()
    }
}

/// Builds, filters and sends events for one session
pub struct EventDispatcher {
    project_id: String,
    options: TrackerOptions,
    host: Arc<dyn Host>,
    transport: Arc<dyn Transport>,
    excluder: PathExcluder,
    key_policy: Arc<dyn UniqueKeyPolicy>,
    /// Grows for the life of the session, never shrinks
    seen_unique_keys: Mutex<HashSet<String>>,
}

impl EventDispatcher {
    pub fn new(
        project_id: impl Into<String>,
        options: TrackerOptions,
        host: Arc<dyn Host>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let excluder = PathExcluder::new(options.exclude_paths.as_slice());
        Self {
            project_id: project_id.into(),
            options,
            host,
            transport,
            excluder,
            key_policy: Arc::new(SerializedOptionsKey),
            seen_unique_keys: Mutex::new(HashSet::new()),
        }
    }

    /// Replace the dedup key policy
    pub fn with_key_policy(mut self, policy: Arc<dyn UniqueKeyPolicy>) -> Self {
        self.key_policy = policy;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Whether events can be sent at all from this session
    pub fn is_enabled(&self) -> bool {
        !self.options.disable_event_tracking && self.host.is_browser()
    }

    /// Current path, honoring the hash/search options
    pub fn current_path(&self) -> String {
        props::path(
            self.host.as_ref(),
            self.options.track_hash,
            self.options.track_search,
        )
        .value
    }

    /// Number of distinct unique events seen so far
    pub fn seen_unique_count(&self) -> usize {
        self.seen_unique_keys.lock().len()
    }

    /// Track an event. Returns immediately; delivery happens in the
    /// background.
    pub fn track(&self, event: &str, options: TrackOptions) -> TrackOutcome {
        if !self.is_enabled() {
            return TrackOutcome::Disabled;
        }

        if options.unique {
            let key = self.key_policy.key(event, &options);
            if !self.seen_unique_keys.lock().insert(key) {
                tracing::debug!(event = %event, "Skipping duplicate unique event");
                return TrackOutcome::Duplicate;
            }
        }

        if event == PAGE_VIEWS_EVENT && !self.excluder.is_empty() {
            let path = self.current_path();
            if let Some(pattern) = self.excluder.find(&path) {
                tracing::debug!(path = %path, pattern = %pattern.as_str(), "Page view excluded");
                return TrackOutcome::Excluded;
            }
        }

        let payload = EventPayload {
            event: event.to_string(),
            website_id: self.project_id.clone(),
            ignore_errors: self.options.ignore_errors,
            remove: options.remove,
            props: options.props,
            update: options.update,
        };

        let body = match encode(&payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "Failed to encode event");
                return TrackOutcome::Dropped;
            }
        };

        tracing::debug!(event = %event, project_id = %self.project_id, "Dispatching event");
        self.transport.send(
            self.options.endpoint(),
            body,
            self.options.on_send_complete.clone(),
        );
        TrackOutcome::Sent
    }

    /// Send an update to the previous event through the teardown mode.
    ///
    /// Returns whether the payload was queued.
    pub fn send_update_beacon(&self, event: &str, props: Properties) -> bool {
        if !self.is_enabled() || !self.transport.supports_beacon() {
            return false;
        }

        let payload = EventPayload {
            event: event.to_string(),
            website_id: self.project_id.clone(),
            ignore_errors: self.options.ignore_errors,
            remove: false,
            props: Some(props),
            update: true,
        };

        match encode(&payload) {
            Ok(body) => self.transport.send_beacon(self.options.endpoint(), body),
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "Failed to encode beacon");
                false
            }
        }
    }
}

fn encode(payload: &EventPayload) -> Result<String> {
    Ok(serde_json::to_string(payload)?)
}
