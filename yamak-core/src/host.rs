//! The page environment the tracker observes.
//!
//! A [`Host`] answers the questions a browser would (location, referrer,
//! preferred language, viewport width, focused link) and lets the tracker
//! register unload and click listeners. Two implementations ship with the
//! crate:
//!
//! - [`HeadlessHost`]: not browser-like; every tracking operation no-ops.
//! - [`SimulatedHost`]: an in-memory page, driven by tests and `yamak replay`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::error::{Error, Result};

/// Handler invoked when the page is being torn down
pub type UnloadHandler = Arc<dyn Fn() + Send + Sync>;

/// Handler invoked for document-level clicks
pub type ClickHandler = Arc<dyn Fn(&ClickEvent) -> ClickDisposition + Send + Sync>;

/// Identifies a registered listener so it can be detached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Browser-like environment
pub trait Host: Send + Sync {
    /// False when running outside anything resembling a browser window
    fn is_browser(&self) -> bool;

    /// Current page location
    fn location(&self) -> Location;

    /// `document.referrer`, if any
    fn referrer(&self) -> Option<String>;

    /// First entry of the visitor's preferred languages
    fn preferred_language(&self) -> Option<String>;

    /// Viewport width in CSS pixels
    fn inner_width(&self) -> u32;

    fn user_agent(&self) -> Option<String>;

    /// `href` of the focused element, if it is a link
    fn active_element_href(&self) -> Option<String>;

    fn on_unload(&self, handler: UnloadHandler) -> ListenerId;

    fn on_click(&self, handler: ClickHandler) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);

    /// Navigate the page programmatically
    fn navigate(&self, href: &str);
}

// ============================================
// Location
// ============================================

/// The pieces of `window.location` the tracker reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub href: String,
    /// Scheme with trailing colon, e.g. `https:`
    pub protocol: String,
    /// Hostname plus port when non-default
    pub host: String,
    pub pathname: String,
    /// `?query`, or empty
    pub search: String,
    /// `#fragment`, or empty
    pub hash: String,
}

impl Location {
    pub fn parse(href: &str) -> Result<Self> {
        let url =
            Url::parse(href).map_err(|e| Error::Config(format!("invalid URL {href:?}: {e}")))?;
        Ok(Self::from_url(&url))
    }

    pub fn from_url(url: &Url) -> Self {
        let mut host = url.host_str().unwrap_or_default().to_string();
        if let Some(port) = url.port() {
            host.push_str(&format!(":{port}"));
        }

        Self {
            href: url.to_string(),
            protocol: format!("{}:", url.scheme()),
            host,
            pathname: url.path().to_string(),
            search: url
                .query()
                .filter(|q| !q.is_empty())
                .map(|q| format!("?{q}"))
                .unwrap_or_default(),
            hash: url
                .fragment()
                .filter(|f| !f.is_empty())
                .map(|f| format!("#{f}"))
                .unwrap_or_default(),
        }
    }

    /// `protocol//host`, without a trailing slash
    pub fn origin(&self) -> String {
        format!("{}//{}", self.protocol, self.host)
    }

    /// Resolve a possibly relative `href` against this location
    pub fn resolve(&self, href: &str) -> Option<Url> {
        Url::parse(&self.href).ok()?.join(href).ok()
    }

    /// Same protocol and host (port included)
    pub fn is_same_host(&self, other: &Location) -> bool {
        !self.host.is_empty() && self.protocol == other.protocol && self.host == other.host
    }

    /// Everything after the origin: pathname, search and hash
    pub fn relative(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }
}

// ============================================
// Clicks
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    /// `click`, delivered for the primary button
    Click,
    /// `auxclick`, delivered for the other buttons
    AuxClick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn any(&self) -> bool {
        self.ctrl || self.shift || self.alt || self.meta
    }
}

/// A node on the click's path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lower-case tag name
    pub tag: String,
    pub href: Option<String>,
    pub target: Option<String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            href: None,
            target: None,
        }
    }

    pub fn anchor(href: impl Into<String>) -> Self {
        Self {
            tag: "a".to_string(),
            href: Some(href.into()),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn is_link(&self) -> bool {
        self.tag == "a" && self.href.is_some()
    }
}

/// A document-level click
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub kind: ClickKind,
    pub button: MouseButton,
    pub modifiers: Modifiers,
    /// Event target first, then its ancestors up to the document root
    pub path: Vec<Element>,
}

impl ClickEvent {
    /// Plain left click
    pub fn primary(path: Vec<Element>) -> Self {
        Self {
            kind: ClickKind::Click,
            button: MouseButton::Primary,
            modifiers: Modifiers::default(),
            path,
        }
    }

    /// Middle-button auxiliary click
    pub fn middle(path: Vec<Element>) -> Self {
        Self {
            kind: ClickKind::AuxClick,
            button: MouseButton::Middle,
            modifiers: Modifiers::default(),
            path,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Nearest link at or above the target
    pub fn link(&self) -> Option<&Element> {
        self.path.iter().find(|el| el.is_link())
    }
}

/// Whether a click handler let the browser follow the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickDisposition {
    Default,
    PreventDefault,
}

// ============================================
// HeadlessHost
// ============================================

/// Host for processes without a page; not browser-like
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessHost;

impl Host for HeadlessHost {
    fn is_browser(&self) -> bool {
        false
    }

    fn location(&self) -> Location {
        Location::default()
    }

    fn referrer(&self) -> Option<String> {
        None
    }

    fn preferred_language(&self) -> Option<String> {
        None
    }

    fn inner_width(&self) -> u32 {
        0
    }

    fn user_agent(&self) -> Option<String> {
        None
    }

    fn active_element_href(&self) -> Option<String> {
        None
    }

    fn on_unload(&self, _handler: UnloadHandler) -> ListenerId {
        ListenerId(0)
    }

    fn on_click(&self, _handler: ClickHandler) -> ListenerId {
        ListenerId(0)
    }

    fn remove_listener(&self, _id: ListenerId) {}

    fn navigate(&self, _href: &str) {}
}

// ============================================
// SimulatedHost
// ============================================

enum Listener {
    Unload(UnloadHandler),
    Click(ClickHandler),
}

struct PageSnapshot {
    location: Location,
    referrer: Option<String>,
    language: Option<String>,
    inner_width: u32,
    user_agent: Option<String>,
    focused_href: Option<String>,
    navigations: Vec<String>,
}

/// In-memory browser page
pub struct SimulatedHost {
    page: Mutex<PageSnapshot>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl SimulatedHost {
    /// A page at `href` with no referrer, `en-US` and a 1280px viewport
    pub fn new(href: &str) -> Result<Self> {
        Ok(Self {
            page: Mutex::new(PageSnapshot {
                location: Location::parse(href)?,
                referrer: None,
                language: Some("en-US".to_string()),
                inner_width: 1280,
                user_agent: None,
                focused_href: None,
                navigations: Vec::new(),
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        })
    }

    pub fn with_referrer(self, referrer: impl Into<String>) -> Self {
        self.page.lock().referrer = Some(referrer.into());
        self
    }

    pub fn with_language(self, language: Option<&str>) -> Self {
        self.page.lock().language = language.map(str::to_string);
        self
    }

    pub fn with_inner_width(self, width: u32) -> Self {
        self.page.lock().inner_width = width;
        self
    }

    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.page.lock().user_agent = Some(user_agent.into());
        self
    }

    /// Client-side route change; no reload, listeners stay attached
    pub fn set_location(&self, href: &str) -> Result<()> {
        let mut page = self.page.lock();
        let next = match page.location.resolve(href) {
            Some(url) => Location::from_url(&url),
            None => Location::parse(href)?,
        };
        page.location = next;
        Ok(())
    }

    /// Focus a link (or clear focus with `None`)
    pub fn focus_link(&self, href: Option<&str>) {
        self.page.lock().focused_href = href.map(str::to_string);
    }

    /// Fire the unload listeners
    pub fn unload(&self) {
        let handlers: Vec<UnloadHandler> = self
            .listeners
            .lock()
            .iter()
            .filter_map(|(_, listener)| match listener {
                Listener::Unload(handler) => Some(Arc::clone(handler)),
                Listener::Click(_) => None,
            })
            .collect();

        for handler in handlers {
            handler();
        }
    }

    /// Dispatch a click to the click listeners
    pub fn click(&self, event: &ClickEvent) -> ClickDisposition {
        let handlers: Vec<ClickHandler> = self
            .listeners
            .lock()
            .iter()
            .filter_map(|(_, listener)| match listener {
                Listener::Click(handler) => Some(Arc::clone(handler)),
                Listener::Unload(_) => None,
            })
            .collect();

        let mut disposition = ClickDisposition::Default;
        for handler in handlers {
            if handler(event) == ClickDisposition::PreventDefault {
                disposition = ClickDisposition::PreventDefault;
            }
        }
        disposition
    }

    /// Programmatic navigations requested so far
    pub fn navigations(&self) -> Vec<String> {
        self.page.lock().navigations.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn register(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }
}

impl Host for SimulatedHost {
    fn is_browser(&self) -> bool {
        true
    }

    fn location(&self) -> Location {
        self.page.lock().location.clone()
    }

    fn referrer(&self) -> Option<String> {
        self.page.lock().referrer.clone()
    }

    fn preferred_language(&self) -> Option<String> {
        self.page.lock().language.clone()
    }

    fn inner_width(&self) -> u32 {
        self.page.lock().inner_width
    }

    fn user_agent(&self) -> Option<String> {
        self.page.lock().user_agent.clone()
    }

    fn active_element_href(&self) -> Option<String> {
        self.page.lock().focused_href.clone()
    }

    fn on_unload(&self, handler: UnloadHandler) -> ListenerId {
        self.register(Listener::Unload(handler))
    }

    fn on_click(&self, handler: ClickHandler) -> ListenerId {
        self.register(Listener::Click(handler))
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }

    fn navigate(&self, href: &str) {
        tracing::debug!(href = %href, "Simulated navigation");
        self.page.lock().navigations.push(href.to_string());
    }
}
