//! Page-view lifecycle tracking
//!
//! The tracker assumes no routing hooks. It polls the host's location every
//! [`POLL_INTERVAL`] and emits a page view whenever the tracked path changes.
//!
//! ```text
//!   start ──► Active ──stop()──► Stopped
//!     │
//!     └── page views disabled / not a browser ──► Inactive (stop() no-ops)
//! ```
//!
//! Each page view carries:
//! - `path` always
//! - `uniqueViews`, `referrer`, `locale`, `screenType` on the first page of
//!   a visit (first page since load, referrer not same-host)
//! - `transitions` when coming from a different previous path or referrer
//! - `duration` on later pages: time spent on the previous one, bucketed
//!
//! On unload, one final update is queued through the transport's beacon
//! mode with the time spent on the last page, and either a bounce flag or
//! the external link the visitor left through.
//!
//! All mutable page state lives behind a single mutex; the poll task, the
//! unload listener and manual [`PageViewTracker::check_path`] calls take it
//! in turn.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatcher::EventDispatcher;
use crate::host::{Host, ListenerId, Location};
use crate::props;
use crate::types::{Properties, TrackOptions, TrackOutcome, NO, PAGE_VIEWS_EVENT, YES};

/// How often the location is checked for a new path
pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Lifecycle state of a [`PageViewTracker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Never started: page views disabled or not a browser
    Inactive,
    Active,
    Stopped,
}

struct PageState {
    /// Last path reported
    current_path: String,
    is_first_page: bool,
    /// Start of the time spent on `current_path`
    last_event_at: Instant,
}

struct Inner {
    dispatcher: Arc<EventDispatcher>,
    /// `None` once stopped
    page: Mutex<Option<PageState>>,
}

/// Polls for path changes and reports page views
pub struct PageViewTracker {
    inner: Option<Arc<Inner>>,
    poll: Mutex<Option<JoinHandle<()>>>,
    unload_listener: Mutex<Option<ListenerId>>,
}

impl PageViewTracker {
    /// Start tracking, emitting the first page view right away.
    pub fn start(dispatcher: Arc<EventDispatcher>) -> Self {
        if dispatcher.options().disable_page_view_tracking || !dispatcher.host().is_browser() {
            return Self::inactive();
        }

        let path = dispatcher.current_path();
        let inner = Arc::new(Inner {
            dispatcher,
            page: Mutex::new(Some(PageState {
                current_path: path.clone(),
                is_first_page: true,
                last_event_at: Instant::now(),
            })),
        });

        let poll = spawn_poll(Arc::downgrade(&inner));

        let weak = Arc::downgrade(&inner);
        let unload_listener = inner.dispatcher.host().on_unload(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_unload();
            }
        }));

        inner.emit(true, path);

        Self {
            inner: Some(inner),
            poll: Mutex::new(poll),
            unload_listener: Mutex::new(Some(unload_listener)),
        }
    }

    /// A tracker that never reports anything
    pub fn inactive() -> Self {
        Self {
            inner: None,
            poll: Mutex::new(None),
            unload_listener: Mutex::new(None),
        }
    }

    pub fn state(&self) -> TrackerState {
        match &self.inner {
            None => TrackerState::Inactive,
            Some(inner) if inner.page.lock().is_some() => TrackerState::Active,
            Some(_) => TrackerState::Stopped,
        }
    }

    /// Run one poll tick now. `None` if the path did not change or the
    /// tracker is not active.
    pub fn check_path(&self) -> Option<TrackOutcome> {
        self.inner.as_ref()?.check_path()
    }

    /// Last path reported
    pub fn current_path(&self) -> Option<String> {
        let inner = self.inner.as_ref()?;
        inner.page.lock().as_ref().map(|p| p.current_path.clone())
    }

    /// Whether the visitor is still on the first page of the visit
    pub fn is_first_page(&self) -> bool {
        self.inner
            .as_ref()
            .and_then(|inner| inner.page.lock().as_ref().map(|p| p.is_first_page))
            .unwrap_or(false)
    }

    /// Flush the final page update as if the page were unloading.
    ///
    /// Returns whether a beacon was queued.
    pub fn flush_unload(&self) -> bool {
        self.inner.as_ref().is_some_and(|inner| inner.on_unload())
    }

    /// Cancel the poll and detach the unload listener. Deliveries already
    /// handed to the transport are not recalled.
    pub fn stop(&self) {
        let Some(inner) = &self.inner else {
            return;
        };

        if let Some(poll) = self.poll.lock().take() {
            poll.abort();
        }
        if let Some(id) = self.unload_listener.lock().take() {
            inner.dispatcher.host().remove_listener(id);
        }
        if inner.page.lock().take().is_some() {
            tracing::debug!("Page view tracking stopped");
        }
    }
}

impl Drop for PageViewTracker {
    fn drop(&mut self) {
        if let Some(poll) = self.poll.get_mut().take() {
            poll.abort();
        }
    }
}

fn spawn_poll(inner: Weak<Inner>) -> Option<JoinHandle<()>> {
    let Ok(handle) = Handle::try_current() else {
        tracing::warn!("No async runtime, path changes are only seen through check_path");
        return None;
    };

    Some(handle.spawn(async move {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.check_path();
        }
    }))
}

impl Inner {
    fn check_path(&self) -> Option<TrackOutcome> {
        let path = self.dispatcher.current_path();
        let props = {
            let mut page = self.page.lock();
            let page = page.as_mut()?;
            if page.current_path == path {
                return None;
            }
            self.page_view_props(page, false, path)
        };
        Some(self.send_page_view(props))
    }

    /// Update the page state for `path` and send its page view.
    fn emit(&self, first: bool, path: String) -> TrackOutcome {
        let props = {
            let mut page = self.page.lock();
            let Some(page) = page.as_mut() else {
                return TrackOutcome::Disabled;
            };
            self.page_view_props(page, first, path)
        };
        self.send_page_view(props)
    }

    // Called outside the lock: completion callbacks may call back in
    fn send_page_view(&self, props: Properties) -> TrackOutcome {
        self.dispatcher
            .track(PAGE_VIEWS_EVENT, TrackOptions::new().props(props))
    }

    fn page_view_props(&self, page: &mut PageState, first: bool, path: String) -> Properties {
        let host = self.dispatcher.host().as_ref();
        let same_host_referrer = props::same_host_referrer(host);

        page.is_first_page = first && same_host_referrer.is_none();

        let mut bag = Properties::new().insert("path", path.clone());

        if page.is_first_page {
            bag.set("uniqueViews", path.clone());
            bag.set("referrer", props::referrer(host));
            bag.set("locale", props::locale(host));
            bag.set("screenType", props::screen_type(host));
        }

        let previous = self.previous_page(page, first, same_host_referrer);
        if let Some(previous) = previous.filter(|p| !p.is_empty() && *p != path) {
            bag.set("transitions", props::transition(&previous, &path));

            if !page.is_first_page {
                let now = Instant::now();
                let spent = now.duration_since(page.last_event_at);
                page.last_event_at = now;
                bag.set(
                    "duration",
                    props::duration_interval(millis(spent), &format!("{} - ", previous)),
                );
            }
        }

        page.current_path = path;
        bag
    }

    /// The recorded path on later pages; on the first page, where the
    /// visitor came from.
    fn previous_page(
        &self,
        page: &PageState,
        first: bool,
        same_host_referrer: Option<Location>,
    ) -> Option<String> {
        if !first && !page.current_path.is_empty() {
            return Some(page.current_path.clone());
        }

        match same_host_referrer {
            Some(referrer) => Some(referrer.relative()),
            None => self.dispatcher.host().referrer(),
        }
    }

    fn on_unload(&self) -> bool {
        if !self.dispatcher.is_enabled() || !self.dispatcher.transport().supports_beacon() {
            return false;
        }

        let bag = {
            let page = self.page.lock();
            let Some(page) = page.as_ref() else {
                return false;
            };

            let host = self.dispatcher.host();
            let mut bag = Properties::new().insert(
                "duration",
                props::duration_interval(
                    millis(page.last_event_at.elapsed()),
                    &format!("{} - ", page.current_path),
                ),
            );

            let next_url = host.active_element_href().unwrap_or_default();
            if next_url.is_empty() {
                bag.set("bounces", if page.is_first_page { YES } else { NO });
            } else if !is_internal(&host.location(), &next_url) {
                bag.set("transitions", props::transition(&page.current_path, &next_url));
            }
            bag
        };

        let queued = self.dispatcher.send_update_beacon(PAGE_VIEWS_EVENT, bag);
        tracing::debug!(queued, "Unload beacon");
        queued
    }
}

/// Root-relative, or resolving to this page's protocol and host
fn is_internal(location: &Location, href: &str) -> bool {
    href.starts_with('/')
        || location
            .resolve(href)
            .is_some_and(|url| Location::from_url(&url).is_same_host(location))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
