//! Outbound link clicks
//!
//! When `track_outbound_links` is set, a document-level click listener
//! reports clicks on links leading to another host. A plain left click that
//! would replace the current page is held back for
//! [`OUTBOUND_NAVIGATION_DELAY`] so the request is issued before the page
//! goes away.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::dispatcher::EventDispatcher;
use crate::host::{ClickDisposition, ClickEvent, ClickKind, Host, ListenerId, Location, MouseButton};
use crate::types::{Properties, TrackOptions, TrackOutcome, OUTBOUND_CLICK_EVENT};

/// Delay before following a held-back link
pub const OUTBOUND_NAVIGATION_DELAY: Duration = Duration::from_millis(150);

/// Link targets that navigate the current browsing context
const SAME_CONTEXT_TARGETS: [&str; 4] = ["", "_self", "_parent", "_top"];

pub struct OutboundClickTracker {
    dispatcher: Weak<EventDispatcher>,
    listener: Mutex<Option<ListenerId>>,
}

impl OutboundClickTracker {
    /// Attach the click listener, unless outbound tracking is off or the
    /// host is not a browser.
    pub fn start(dispatcher: &Arc<EventDispatcher>) -> Self {
        let weak = Arc::downgrade(dispatcher);

        if !dispatcher.options().track_outbound_links || !dispatcher.host().is_browser() {
            return Self {
                dispatcher: weak,
                listener: Mutex::new(None),
            };
        }

        let handler_dispatcher = weak.clone();
        let id = dispatcher.host().on_click(Arc::new(move |event| {
            match handler_dispatcher.upgrade() {
                Some(dispatcher) => handle_click(&dispatcher, event),
                None => ClickDisposition::Default,
            }
        }));
        tracing::debug!("Outbound link tracking attached");

        Self {
            dispatcher: weak,
            listener: Mutex::new(Some(id)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Detach the click listener
    pub fn stop(&self) {
        let Some(id) = self.listener.lock().take() else {
            return;
        };
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.host().remove_listener(id);
        }
    }
}

/// Report `event` if it follows a link to another host.
///
/// Returns [`ClickDisposition::PreventDefault`] when navigation was taken
/// over and will happen after [`OUTBOUND_NAVIGATION_DELAY`].
pub fn handle_click(dispatcher: &EventDispatcher, event: &ClickEvent) -> ClickDisposition {
    let tracked_button = matches!(
        (event.kind, event.button),
        (ClickKind::Click, MouseButton::Primary) | (ClickKind::AuxClick, MouseButton::Middle)
    );
    if !tracked_button {
        return ClickDisposition::Default;
    }

    let Some(link) = event.link() else {
        return ClickDisposition::Default;
    };
    let Some(href) = link.href.as_deref() else {
        return ClickDisposition::Default;
    };

    let location = dispatcher.host().location();
    let Some(url) = location.resolve(href) else {
        tracing::debug!(href = %href, "Ignoring click on unresolvable link");
        return ClickDisposition::Default;
    };
    // mailto:, tel: and javascript: links have no host to leave for
    let target_host = Location::from_url(&url).host;
    if target_host.is_empty() || target_host == location.host {
        return ClickDisposition::Default;
    }

    let target_url = url.to_string();
    let outcome = dispatcher.track(
        OUTBOUND_CLICK_EVENT,
        TrackOptions::new().props(Properties::new().insert("url", target_url.clone())),
    );
    if outcome != TrackOutcome::Sent {
        return ClickDisposition::Default;
    }

    let target = link.target.as_deref().unwrap_or_default();
    let replaces_page = event.kind == ClickKind::Click
        && !event.modifiers.any()
        && SAME_CONTEXT_TARGETS.contains(&target);
    if !replaces_page {
        return ClickDisposition::Default;
    }

    let Ok(runtime) = Handle::try_current() else {
        // Nothing to run the delayed navigation on; let the browser follow
        return ClickDisposition::Default;
    };

    let host = Arc::clone(dispatcher.host());
    runtime.spawn(async move {
        tokio::time::sleep(OUTBOUND_NAVIGATION_DELAY).await;
        host.navigate(&target_url);
    });
    ClickDisposition::PreventDefault
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerOptions;
    use crate::host::{Element, Modifiers, SimulatedHost};
    use crate::transport::MemoryTransport;

    struct Fixture {
        host: Arc<SimulatedHost>,
        transport: Arc<MemoryTransport>,
        _dispatcher: Arc<EventDispatcher>,
        tracker: OutboundClickTracker,
    }

    fn fixture(options: TrackerOptions) -> Fixture {
        let host = Arc::new(SimulatedHost::new("https://example.com/blog/post").unwrap());
        let transport = Arc::new(MemoryTransport::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            "site-1",
            options,
            host.clone(),
            transport.clone(),
        ));
        let tracker = OutboundClickTracker::start(&dispatcher);
        Fixture {
            host,
            transport,
            _dispatcher: dispatcher,
            tracker,
        }
    }

    fn enabled() -> Fixture {
        fixture(TrackerOptions {
            track_outbound_links: true,
            ..Default::default()
        })
    }

    fn link_path(anchor: Element) -> Vec<Element> {
        vec![Element::new("img"), anchor, Element::new("body")]
    }

    #[tokio::test(start_paused = true)]
    async fn test_left_click_delays_navigation() {
        let fx = enabled();
        let click = ClickEvent::primary(link_path(Element::anchor("https://partner.org/deal")));

        assert_eq!(fx.host.click(&click), ClickDisposition::PreventDefault);

        let payloads = fx.transport.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].event, OUTBOUND_CLICK_EVENT);
        assert_eq!(
            payloads[0].props.as_ref().unwrap().get("url").unwrap(),
            "https://partner.org/deal"
        );
        assert!(fx.host.navigations().is_empty());

        tokio::time::sleep(OUTBOUND_NAVIGATION_DELAY + Duration::from_millis(1)).await;
        assert_eq!(fx.host.navigations(), vec!["https://partner.org/deal".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_middle_click_reported_without_delay() {
        let fx = enabled();
        let click = ClickEvent::middle(link_path(Element::anchor("https://partner.org/")));

        assert_eq!(fx.host.click(&click), ClickDisposition::Default);
        assert_eq!(fx.transport.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_modified_click_not_held_back() {
        let fx = enabled();
        let click = ClickEvent::primary(link_path(Element::anchor("https://partner.org/")))
            .with_modifiers(Modifiers {
                meta: true,
                ..Default::default()
            });

        assert_eq!(fx.host.click(&click), ClickDisposition::Default);
        assert_eq!(fx.transport.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_tab_target_not_held_back() {
        let fx = enabled();
        let anchor = Element::anchor("https://partner.org/").with_target("_blank");

        assert_eq!(
            fx.host.click(&ClickEvent::primary(link_path(anchor))),
            ClickDisposition::Default
        );
        assert_eq!(fx.transport.len(), 1);

        let anchor = Element::anchor("https://partner.org/").with_target("_top");
        assert_eq!(
            fx.host.click(&ClickEvent::primary(link_path(anchor))),
            ClickDisposition::PreventDefault
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_host_links_ignored() {
        let fx = enabled();
        for href in ["/pricing", "../about", "https://example.com/contact"] {
            let click = ClickEvent::primary(link_path(Element::anchor(href)));
            assert_eq!(fx.host.click(&click), ClickDisposition::Default);
        }
        assert!(fx.transport.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hostless_links_ignored() {
        let fx = enabled();
        for href in ["mailto:a@b.c", "tel:+15550100", "javascript:void(0)"] {
            let click = ClickEvent::primary(link_path(Element::anchor(href)));
            assert_eq!(fx.host.click(&click), ClickDisposition::Default, "{href}");
        }
        assert!(fx.transport.is_empty());

        tokio::time::sleep(OUTBOUND_NAVIGATION_DELAY * 2).await;
        assert!(fx.host.navigations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clicks_without_link_or_on_secondary_button() {
        let fx = enabled();
        fx.host.click(&ClickEvent::primary(vec![Element::new("div")]));

        let mut right = ClickEvent::middle(link_path(Element::anchor("https://partner.org/")));
        right.button = MouseButton::Secondary;
        fx.host.click(&right);

        assert!(fx.transport.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_by_default() {
        let fx = fixture(TrackerOptions::default());
        assert!(!fx.tracker.is_active());
        assert_eq!(fx.host.listener_count(), 0);

        let click = ClickEvent::primary(link_path(Element::anchor("https://partner.org/")));
        assert_eq!(fx.host.click(&click), ClickDisposition::Default);
        assert!(fx.transport.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_detaches_listener() {
        let fx = enabled();
        assert!(fx.tracker.is_active());
        fx.tracker.stop();
        assert!(!fx.tracker.is_active());
        assert_eq!(fx.host.listener_count(), 0);

        let click = ClickEvent::primary(link_path(Element::anchor("https://partner.org/")));
        assert_eq!(fx.host.click(&click), ClickDisposition::Default);
        assert!(fx.transport.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_tracking_disabled_lets_browser_navigate() {
        let fx = fixture(TrackerOptions {
            track_outbound_links: true,
            disable_event_tracking: true,
            ..Default::default()
        });
        let click = ClickEvent::primary(link_path(Element::anchor("https://partner.org/")));
        assert_eq!(fx.host.click(&click), ClickDisposition::Default);
        assert!(fx.transport.is_empty());
    }
}
