//! Property extractors
//!
//! Each function computes one [`TrackedProperty`] from the current state of
//! the [`Host`]. They are stateless and can be called directly for custom
//! instrumentation:
//!
//! ```
//! use yamak_core::{props, SimulatedHost, TrackOptions, Properties};
//!
//! let host = SimulatedHost::new("https://example.com/pricing").unwrap();
//! let options = TrackOptions::new().props(
//!     Properties::new()
//!         .insert("locale", props::locale(&host))
//!         .insert("screenType", props::screen_type(&host)),
//! );
//! assert!(options.props.is_some());
//! ```
//!
//! Every extractor that reads the host returns [`NOT_IN_BROWSER`] when the
//! host is not browser-like.

use crate::host::{Host, Location};
use crate::types::{
    DurationBucket, PropertyKind, ScreenType, TrackedProperty, NONE, NOT_IN_BROWSER,
};

/// Normalize a raw locale string to `xx` or `xx-YY`.
///
/// Strips one surrounding `"` on each side, then upper-cases the region of
/// a five character `xx-yy` locale. Anything else is returned as-is.
pub fn normalize_locale(raw: &str) -> String {
    let trimmed = raw.strip_prefix('"').unwrap_or(raw);
    let trimmed = trimmed.strip_suffix('"').unwrap_or(trimmed);

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() == 5 && chars[2] == '-' {
        let language: String = chars[..3].iter().collect();
        let region: String = chars[3..].iter().collect();
        return format!("{}{}", language, region.to_uppercase());
    }
    trimmed.to_string()
}

/// Preferred locale of the visitor, `<none>` if unavailable
pub fn locale(host: &dyn Host) -> TrackedProperty {
    if !host.is_browser() {
        return TrackedProperty::not_in_browser(PropertyKind::Locale);
    }

    let value = host
        .preferred_language()
        .map(|raw| normalize_locale(&raw))
        .filter(|locale| !locale.is_empty())
        .unwrap_or_else(|| NONE.to_string());
    TrackedProperty::new(PropertyKind::Locale, value)
}

/// Screen type of the visitor, based on viewport width:
///
/// - width <= 414: XS -> phone
/// - width <= 800: S -> tablet
/// - width <= 1200: M -> small laptop
/// - width <= 1600: L -> large laptop
/// - width > 1600: XL -> large desktop
pub fn screen_type(host: &dyn Host) -> TrackedProperty {
    if !host.is_browser() {
        return TrackedProperty::not_in_browser(PropertyKind::ScreenType);
    }
    TrackedProperty::new(
        PropertyKind::ScreenType,
        ScreenType::from_width(host.inner_width()).as_str(),
    )
}

/// The referrer, parsed, when its protocol and host are this page's
pub fn same_host_referrer(host: &dyn Host) -> Option<Location> {
    if !host.is_browser() {
        return None;
    }
    let referrer = Location::parse(&host.referrer()?).ok()?;
    referrer.is_same_host(&host.location()).then_some(referrer)
}

/// True if the referrer has this page's protocol and host
pub fn is_referrer_same_host(host: &dyn Host) -> bool {
    same_host_referrer(host).is_some()
}

/// Referrer of the current page, `<none>` if absent or same-host
pub fn referrer(host: &dyn Host) -> TrackedProperty {
    if !host.is_browser() {
        return TrackedProperty::not_in_browser(PropertyKind::Referrer);
    }
    if is_referrer_same_host(host) {
        return TrackedProperty::new(PropertyKind::Referrer, NONE);
    }

    let value = host
        .referrer()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| NONE.to_string());
    TrackedProperty::new(PropertyKind::Referrer, value)
}

/// Current path within the application.
///
/// `hash` and `search` opt into appending `location.hash` and
/// `location.search`. With both set the hash is appended whole, since
/// hash-routed apps carry their query inside the fragment.
pub fn path(host: &dyn Host, hash: bool, search: bool) -> TrackedProperty {
    if !host.is_browser() {
        return TrackedProperty::not_in_browser(PropertyKind::Path);
    }

    let location = host.location();
    let mut value = location.pathname;

    if hash && search {
        value.push_str(&location.hash);
    } else if hash {
        let cut = location.hash.len().saturating_sub(location.search.len());
        value.push_str(location.hash.get(..cut).unwrap_or(&location.hash));
    } else if search {
        value.push_str(&location.search);
    }

    TrackedProperty::new(PropertyKind::Path, value)
}

/// Transition between two values, `"<previous>  ->  <next>"`
pub fn transition(previous: &str, next: &str) -> TrackedProperty {
    TrackedProperty::new(
        PropertyKind::Transition,
        format!("{}  ->  {}", previous, next),
    )
}

/// Bucketed duration (`< 5s`, `< 15s`, `< 30s`, `< 1m`, `< 5m`, `> 5m`),
/// prefixed with `prefix`
pub fn duration_interval(duration_ms: u64, prefix: &str) -> TrackedProperty {
    TrackedProperty::new(
        PropertyKind::DurationInterval,
        format!("{}{}", prefix, DurationBucket::from_millis(duration_ms).label()),
    )
}

/// Operating system of the visitor: Windows, Mac OS X, iOS, Android or Linux
pub fn os(host: &dyn Host) -> TrackedProperty {
    if !host.is_browser() {
        return TrackedProperty::not_in_browser(PropertyKind::Os);
    }
    let value = host
        .user_agent()
        .and_then(|ua| detect_os(&ua))
        .unwrap_or(NONE);
    TrackedProperty::new(PropertyKind::Os, value)
}

/// Browser of the visitor: Chrome, Firefox, Safari, Edge, with a `Mobile `
/// prefix on phones and tablets
pub fn browser(host: &dyn Host) -> TrackedProperty {
    if !host.is_browser() {
        return TrackedProperty::not_in_browser(PropertyKind::Browser);
    }
    let value = host
        .user_agent()
        .and_then(|ua| detect_browser(&ua))
        .unwrap_or_else(|| NONE.to_string());
    TrackedProperty::new(PropertyKind::Browser, value)
}

fn detect_os(ua: &str) -> Option<&'static str> {
    // iOS agents also claim "like Mac OS X", Android agents claim Linux
    if ua.contains("Windows") {
        Some("Windows")
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
        Some("iOS")
    } else if ua.contains("Mac OS X") {
        Some("Mac OS X")
    } else if ua.contains("Android") {
        Some("Android")
    } else if ua.contains("Linux") {
        Some("Linux")
    } else {
        None
    }
}

fn detect_browser(ua: &str) -> Option<String> {
    // Order matters: Edge claims Chrome and Safari, Chrome claims Safari
    let name = if ua.contains("Edg/") || ua.contains("EdgA/") || ua.contains("EdgiOS/") {
        "Edge"
    } else if ua.contains("Firefox/") || ua.contains("FxiOS/") {
        "Firefox"
    } else if ua.contains("Chrome/") || ua.contains("CriOS/") {
        "Chrome"
    } else if ua.contains("Safari/") {
        "Safari"
    } else {
        return None;
    };

    let mobile = ua.contains("Mobile") || ua.contains("Android");
    Some(if mobile {
        format!("Mobile {name}")
    } else {
        name.to_string()
    })
}
