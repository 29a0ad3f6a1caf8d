//! # yamak-core
//!
//! Client-side web analytics beacon for the Yamak collector.
//!
//! This library provides:
//! - Page-view tracking by polling the page location, with first-visit,
//!   transition, time-on-page and bounce properties
//! - Outbound link click tracking
//! - Custom events with property bags, unique-per-session dedup and path
//!   exclusion
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! The page itself is abstracted behind [`Host`]; events flow
//!
//! ```text
//! PageViewTracker ─┐
//! OutboundClick ───┼─► EventDispatcher ─► Transport ─► collector
//! App::track ──────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use yamak_core::{App, MemoryTransport, Properties, SimulatedHost, TrackOptions};
//!
//! # async fn run() -> yamak_core::Result<()> {
//! let host = Arc::new(SimulatedHost::new("https://example.com/home")?);
//! let app = App::builder("my-site")
//!     .host(host.clone())
//!     .transport(Arc::new(MemoryTransport::new()))
//!     .build()?;
//!
//! app.track(
//!     "Signup",
//!     TrackOptions::new().props(Properties::new().insert("plan", "pro")),
//! );
//! app.stop();
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;
use std::sync::{Arc, OnceLock};

use parking_lot::ReentrantMutex;

// Re-export commonly used items at the crate root
pub use app::{App, AppBuilder};
pub use config::{Config, TrackerOptions};
pub use dispatcher::{EventDispatcher, EventNameKey, SerializedOptionsKey, UniqueKeyPolicy};
pub use error::{Error, Result};
pub use host::{HeadlessHost, Host, Location, SimulatedHost};
pub use tracker::TrackerState;
pub use transport::{HttpTransport, MemoryTransport, SendCallback, SendOutcome, Transport};
pub use types::*;

// Public modules
pub mod app;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod logging;
pub mod matcher;
pub mod outbound;
pub mod props;
pub mod tracker;
pub mod transport;
pub mod types;

static SESSION: OnceLock<Arc<App>> = OnceLock::new();
// Reentrant: a send callback fired during the build may call `init`.
static INIT_LOCK: ReentrantMutex<Cell<bool>> = parking_lot::const_reentrant_mutex(Cell::new(false));

struct Building<'a>(&'a Cell<bool>);

impl<'a> Building<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Building<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Start the process-wide session.
///
/// The first successful call wins: later calls return the same session and
/// ignore their arguments. Returns `None` without starting anything when
/// `host` is not browser-like, or when called from a callback that fires
/// while the session is still starting.
pub fn init(
    project_id: impl Into<String>,
    options: TrackerOptions,
    host: Arc<dyn Host>,
) -> Option<Arc<App>> {
    init_with(App::builder(project_id).options(options).host(host))
}

/// [`init`] with full control over the session's collaborators
pub fn init_with(builder: AppBuilder) -> Option<Arc<App>> {
    if let Some(app) = SESSION.get() {
        return Some(Arc::clone(app));
    }

    let guard = INIT_LOCK.lock();
    if let Some(app) = SESSION.get() {
        return Some(Arc::clone(app));
    }
    if guard.get() {
        tracing::debug!("Session is starting, nested init ignored");
        return None;
    }

    if !builder.is_browser() {
        tracing::debug!("Not running in a browser, session not started");
        return None;
    }

    let building = Building::enter(&guard);
    let built = builder.build();
    drop(building);

    let app = match built {
        Ok(app) => Arc::new(app),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to start tracking session");
            return None;
        }
    };

    Some(Arc::clone(SESSION.get_or_init(|| app)))
}

/// The process-wide session, if [`init`] succeeded
pub fn session() -> Option<Arc<App>> {
    SESSION.get().cloned()
}

/// Track an event on the process-wide session
pub fn track(event: &str, options: TrackOptions) -> TrackOutcome {
    match SESSION.get() {
        Some(app) => app.track(event, options),
        None => TrackOutcome::NoSession,
    }
}
