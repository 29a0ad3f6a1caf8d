//! Core domain types for yamak
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Project** | The website being measured; identified by an opaque project id |
//! | **Page view** | One logical path/route seen by the visitor |
//! | **Transition** | Movement from one path (or referrer) to the next |
//! | **Bounce** | A visit that ends with no further navigation in the tab |
//! | **Unique event** | An event counted at most once per session |
//!
//! Property values are always strings on the wire. When the host cannot
//! answer (not a browser, no referrer, ...) a sentinel such as
//! [`NOT_IN_BROWSER`] or [`NONE`] takes the place of the real value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================
// Constants
// ============================================

/// Default collector endpoint
pub const API_URL: &str = "https://app.yamak.io/collect";

/// Event name used for page views and their unload updates
pub const PAGE_VIEWS_EVENT: &str = "Page Views";

/// Event name used for clicks on links leaving the site
pub const OUTBOUND_CLICK_EVENT: &str = "Outbound Link Click";

/// Sentinel for values read outside a browser-like host
pub const NOT_IN_BROWSER: &str = "<not-in-browser>";

/// Sentinel for values the host could not provide
pub const NONE: &str = "<none>";

pub const YES: &str = "Yes";
pub const NO: &str = "No";

// ============================================
// Tracked properties
// ============================================

/// Kind of a [`TrackedProperty`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyKind {
    Locale,
    ScreenType,
    Referrer,
    Path,
    Transition,
    DurationInterval,
    Os,
    Browser,
}

impl PropertyKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::Locale => "locale",
            PropertyKind::ScreenType => "screen-type",
            PropertyKind::Referrer => "referrer",
            PropertyKind::Path => "path",
            PropertyKind::Transition => "transition",
            PropertyKind::DurationInterval => "duration-interval",
            PropertyKind::Os => "os",
            PropertyKind::Browser => "browser",
        }
    }
}

/// A labeled property value, serialized as `{"type": ..., "value": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedProperty {
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    pub value: String,
}

impl TrackedProperty {
    pub fn new(kind: PropertyKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Property carrying the [`NOT_IN_BROWSER`] sentinel
    pub fn not_in_browser(kind: PropertyKind) -> Self {
        Self::new(kind, NOT_IN_BROWSER)
    }
}

impl From<TrackedProperty> for Value {
    fn from(prop: TrackedProperty) -> Self {
        serde_json::json!({
            "type": prop.kind.as_str(),
            "value": prop.value,
        })
    }
}

/// Viewport width bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScreenType {
    /// Phone
    XS,
    /// Tablet
    S,
    /// Small laptop
    M,
    /// Large laptop
    L,
    /// Large desktop
    XL,
}

impl ScreenType {
    /// Bucket a viewport width. Bands are closed on their upper bound.
    pub fn from_width(width: u32) -> Self {
        match width {
            0..=414 => ScreenType::XS,
            415..=800 => ScreenType::S,
            801..=1200 => ScreenType::M,
            1201..=1600 => ScreenType::L,
            _ => ScreenType::XL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenType::XS => "XS",
            ScreenType::S => "S",
            ScreenType::M => "M",
            ScreenType::L => "L",
            ScreenType::XL => "XL",
        }
    }
}

/// Coarse bucket for time spent on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DurationBucket {
    UnderFiveSeconds,
    UnderFifteenSeconds,
    UnderThirtySeconds,
    UnderOneMinute,
    UnderFiveMinutes,
    OverFiveMinutes,
}

impl DurationBucket {
    /// Bucket a duration; thresholds are strict less-than.
    pub fn from_millis(ms: u64) -> Self {
        if ms < 5_000 {
            DurationBucket::UnderFiveSeconds
        } else if ms < 15_000 {
            DurationBucket::UnderFifteenSeconds
        } else if ms < 30_000 {
            DurationBucket::UnderThirtySeconds
        } else if ms < 60_000 {
            DurationBucket::UnderOneMinute
        } else if ms < 5 * 60_000 {
            DurationBucket::UnderFiveMinutes
        } else {
            DurationBucket::OverFiveMinutes
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DurationBucket::UnderFiveSeconds => "< 5s",
            DurationBucket::UnderFifteenSeconds => "< 15s",
            DurationBucket::UnderThirtySeconds => "< 30s",
            DurationBucket::UnderOneMinute => "< 1m",
            DurationBucket::UnderFiveMinutes => "< 5m",
            DurationBucket::OverFiveMinutes => "> 5m",
        }
    }
}

// ============================================
// Property bag
// ============================================

/// Property bag attached to an event.
///
/// ```
/// use yamak_core::{props, Properties};
///
/// let bag = Properties::new()
///     .insert("path", "/pricing")
///     .insert("transitions", props::transition("/", "/pricing"));
/// assert_eq!(bag.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    inner: Map<String, Value>,
}

impl Properties {
    pub fn new() -> Self {
        Self { inner: Map::new() }
    }

    /// Inserts a key-value pair, replacing any previous value for the key.
    pub fn insert<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.inner.insert(key.into(), value.into());
        self
    }

    /// In-place variant of [`Properties::insert`]
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.inner.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.inner)
    }
}

impl From<Properties> for Value {
    fn from(props: Properties) -> Self {
        props.into_value()
    }
}

impl From<Map<String, Value>> for Properties {
    fn from(map: Map<String, Value>) -> Self {
        Self { inner: map }
    }
}

// ============================================
// Events
// ============================================

/// Per-call options for [`crate::EventDispatcher::track`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackOptions {
    /// Count this event at most once per session
    #[serde(skip_serializing_if = "is_false")]
    pub unique: bool,
    /// Ask the collector to remove a previously recorded event
    #[serde(skip_serializing_if = "is_false")]
    pub remove: bool,
    /// Amend the previous event instead of recording a new one
    #[serde(skip_serializing_if = "is_false")]
    pub update: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<Properties>,
}

impl TrackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn remove(mut self) -> Self {
        self.remove = true;
        self
    }

    pub fn update(mut self) -> Self {
        self.update = true;
        self
    }

    pub fn props(mut self, props: Properties) -> Self {
        self.props = Some(props);
        self
    }
}

/// JSON body posted to the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub event: String,
    pub website_id: String,
    pub ignore_errors: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub remove: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Properties>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub update: bool,
}

/// What happened to a tracked event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Handed to the transport
    Sent,
    /// Event tracking disabled, or not running in a browser-like host
    Disabled,
    /// Unique event already seen in this session
    Duplicate,
    /// Page view on an excluded path
    Excluded,
    /// Payload could not be encoded
    Dropped,
    /// No session has been initialized
    NoSession,
}

fn is_false(value: &bool) -> bool {
    !*value
}
