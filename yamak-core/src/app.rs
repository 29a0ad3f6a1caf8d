//! Tracking session handle

use std::sync::Arc;

use crate::config::{TrackerOptions, TransportConfig};
use crate::dispatcher::{EventDispatcher, UniqueKeyPolicy};
use crate::error::Result;
use crate::host::{HeadlessHost, Host};
use crate::outbound::OutboundClickTracker;
use crate::tracker::{PageViewTracker, TrackerState};
use crate::transport::{HttpTransport, Transport};
use crate::types::{TrackOptions, TrackOutcome};

/// Builder for an [`App`].
///
/// Without a host the session is headless and sends nothing. Without a
/// transport events go over HTTP using `transport_config`.
pub struct AppBuilder {
    project_id: String,
    options: TrackerOptions,
    host: Option<Arc<dyn Host>>,
    transport: Option<Arc<dyn Transport>>,
    transport_config: TransportConfig,
    key_policy: Option<Arc<dyn UniqueKeyPolicy>>,
}

impl AppBuilder {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            options: TrackerOptions::default(),
            host: None,
            transport: None,
            transport_config: TransportConfig::default(),
            key_policy: None,
        }
    }

    pub fn options(mut self, options: TrackerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Settings for the default HTTP transport
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Dedup key policy for unique events
    pub fn key_policy(mut self, policy: Arc<dyn UniqueKeyPolicy>) -> Self {
        self.key_policy = Some(policy);
        self
    }

    /// Whether the configured host is browser-like
    pub fn is_browser(&self) -> bool {
        self.host.as_ref().is_some_and(|host| host.is_browser())
    }

    /// Start the session.
    ///
    /// Starts page-view polling and reports the first page view, so this
    /// should run inside a tokio runtime.
    pub fn build(self) -> Result<App> {
        let host = self.host.unwrap_or_else(|| Arc::new(HeadlessHost));
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.transport_config)?),
        };

        let mut dispatcher = EventDispatcher::new(self.project_id, self.options, host, transport);
        if let Some(policy) = self.key_policy {
            dispatcher = dispatcher.with_key_policy(policy);
        }
        let dispatcher = Arc::new(dispatcher);

        tracing::info!(
            project_id = %dispatcher.project_id(),
            browser = dispatcher.host().is_browser(),
            endpoint = %dispatcher.options().endpoint(),
            "Tracking session started"
        );

        let outbound = OutboundClickTracker::start(&dispatcher);
        let page_views = PageViewTracker::start(Arc::clone(&dispatcher));

        Ok(App {
            dispatcher,
            page_views,
            outbound,
        })
    }
}

/// One tracking session: page views, outbound clicks and custom events for
/// a single project.
pub struct App {
    dispatcher: Arc<EventDispatcher>,
    page_views: PageViewTracker,
    outbound: OutboundClickTracker,
}

impl App {
    pub fn builder(project_id: impl Into<String>) -> AppBuilder {
        AppBuilder::new(project_id)
    }

    /// Track a custom event. Never blocks on delivery.
    pub fn track(&self, event: &str, options: TrackOptions) -> TrackOutcome {
        self.dispatcher.track(event, options)
    }

    /// Check the location for a new path now, without waiting for the
    /// next poll.
    pub fn check_page(&self) -> Option<TrackOutcome> {
        self.page_views.check_path()
    }

    /// Stop polling and detach listeners. Explicit [`App::track`] calls
    /// keep working.
    pub fn stop(&self) {
        self.page_views.stop();
        self.outbound.stop();
    }

    pub fn project_id(&self) -> &str {
        self.dispatcher.project_id()
    }

    pub fn options(&self) -> &TrackerOptions {
        self.dispatcher.options()
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        self.dispatcher.host()
    }

    pub fn page_view_state(&self) -> TrackerState {
        self.page_views.state()
    }

    /// Path of the last page view
    pub fn current_path(&self) -> Option<String> {
        self.page_views.current_path()
    }

    pub fn tracks_outbound_links(&self) -> bool {
        self.outbound.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::EventNameKey;
    use crate::host::{ClickEvent, Element, SimulatedHost};
    use crate::transport::MemoryTransport;
    use crate::types::{Properties, OUTBOUND_CLICK_EVENT, PAGE_VIEWS_EVENT};

    fn simulated(href: &str) -> (Arc<SimulatedHost>, Arc<MemoryTransport>, AppBuilder) {
        let host = Arc::new(SimulatedHost::new(href).unwrap());
        let transport = Arc::new(MemoryTransport::new());
        let builder = App::builder("site-1")
            .host(host.clone())
            .transport(transport.clone());
        (host, transport, builder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_reports_first_page_view() {
        let (_host, transport, builder) = simulated("https://example.com/home");
        let app = builder.build().unwrap();

        assert_eq!(app.project_id(), "site-1");
        assert_eq!(app.page_view_state(), TrackerState::Active);
        assert_eq!(app.current_path().as_deref(), Some("/home"));

        let payloads = transport.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].event, PAGE_VIEWS_EVENT);
        assert_eq!(payloads[0].website_id, "site-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_event() {
        let (_host, transport, builder) = simulated("https://example.com/");
        let app = builder.build().unwrap();

        let outcome = app.track(
            "Signup",
            TrackOptions::new().props(Properties::new().insert("plan", "team")),
        );
        assert_eq!(outcome, TrackOutcome::Sent);
        assert_eq!(transport.payloads()[1].event, "Signup");
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_page_after_route_change() {
        let (host, transport, builder) = simulated("https://example.com/");
        let app = builder.build().unwrap();

        assert_eq!(app.check_page(), None);
        host.set_location("/docs").unwrap();
        assert_eq!(app.check_page(), Some(TrackOutcome::Sent));
        assert_eq!(transport.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_detaches_everything() {
        let (host, transport, builder) = simulated("https://example.com/");
        let app = builder
            .options(TrackerOptions {
                track_outbound_links: true,
                ..Default::default()
            })
            .build()
            .unwrap();
        assert!(app.tracks_outbound_links());
        assert_eq!(host.listener_count(), 2);

        app.stop();
        assert_eq!(app.page_view_state(), TrackerState::Stopped);
        assert!(!app.tracks_outbound_links());
        assert_eq!(host.listener_count(), 0);

        host.click(&ClickEvent::primary(vec![Element::anchor("https://other.org/")]));
        assert!(transport
            .payloads()
            .iter()
            .all(|p| p.event != OUTBOUND_CLICK_EVENT));

        // Explicit events still go out
        assert_eq!(app.track("After", TrackOptions::new()), TrackOutcome::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_headless_by_default() {
        let transport = Arc::new(MemoryTransport::new());
        let app = App::builder("site-1")
            .transport(transport.clone())
            .build()
            .unwrap();

        assert!(!app.host().is_browser());
        assert_eq!(app.page_view_state(), TrackerState::Inactive);
        assert_eq!(app.track("Signup", TrackOptions::new()), TrackOutcome::Disabled);
        assert!(transport.is_empty());
        app.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_policy_applied() {
        let (_host, transport, builder) = simulated("https://example.com/");
        let app = builder.key_policy(Arc::new(EventNameKey)).build().unwrap();

        let first = TrackOptions::new().unique().props(Properties::new().insert("n", 1));
        let second = TrackOptions::new().unique().props(Properties::new().insert("n", 2));
        assert_eq!(app.track("Once", first), TrackOutcome::Sent);
        assert_eq!(app.track("Once", second), TrackOutcome::Duplicate);
        assert_eq!(transport.len(), 2);
    }

    #[test]
    fn test_builder_is_browser() {
        assert!(!AppBuilder::new("p").is_browser());
        let host = Arc::new(SimulatedHost::new("https://example.com/").unwrap());
        assert!(AppBuilder::new("p").host(host).is_browser());
    }
}
