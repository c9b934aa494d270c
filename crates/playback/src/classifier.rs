// Origin classifier: decides per-URL whether a fetch must be routed through
// the same-origin relay. Pure and total; parse failures resolve toward the
// relay rather than toward an uncontrolled cross-origin request.

use url::Url;

/// Why a URL was (or was not) classified as needing the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyReason {
    /// Absolute or protocol-relative URL whose origin matches the page origin.
    SameOrigin,
    /// Absolute or protocol-relative URL with a different origin.
    CrossOrigin,
    /// Root-relative, current-directory or parent-relative path.
    Relative,
    /// Inline `data:` payload; has no origin.
    DataUri,
    /// Could not be parsed as a URL.
    Unparseable,
}

/// Outcome of classifying one URL against the current origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyDecision {
    pub relay: bool,
    pub reason: ClassifyReason,
}

impl ProxyDecision {
    fn no_relay(reason: ClassifyReason) -> Self {
        Self {
            relay: false,
            reason,
        }
    }

    fn relay(reason: ClassifyReason) -> Self {
        Self {
            relay: true,
            reason,
        }
    }
}

/// Classify `url` against `current_origin` (e.g. `https://site.example`).
///
/// Rules are applied in order, first match wins:
/// 1. `data:` URIs are inline payloads and never relayed.
/// 2. Protocol-relative URLs (`//host/path`) inherit the page scheme, then
///    compare origins.
/// 3. URLs with an explicit `scheme://` compare origins.
/// 4. Relative paths (`/p`, `./p`, `../p`, bare `p`) are same-origin by
///    construction.
/// 5. Anything that fails to parse under 2-3, or that cannot be a URL at all
///    (embedded whitespace), is relayed as the conservative default.
pub fn classify(url: &str, current_origin: &str) -> ProxyDecision {
    if url.starts_with("data:") {
        return ProxyDecision::no_relay(ClassifyReason::DataUri);
    }

    if let Some(rest) = url.strip_prefix("//") {
        let scheme = current_scheme(current_origin);
        return compare_origins(&format!("{scheme}://{rest}"), current_origin);
    }

    // Anything carrying a scheme separator must parse as an absolute URL;
    // a failed parse here is exactly the fail-safe case.
    if url.contains("://") {
        return compare_origins(url, current_origin);
    }

    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return ProxyDecision::relay(ClassifyReason::Unparseable);
    }

    // Root-relative, `./`, `../` and bare paths all resolve against the
    // current origin and cannot leave it.
    ProxyDecision::no_relay(ClassifyReason::Relative)
}

/// Convenience predicate matching the external contract:
/// `true` means the relay is required.
pub fn needs_relay(url: &str, current_origin: &str) -> bool {
    classify(url, current_origin).relay
}

fn compare_origins(url: &str, current_origin: &str) -> ProxyDecision {
    let Ok(parsed) = Url::parse(url) else {
        return ProxyDecision::relay(ClassifyReason::Unparseable);
    };
    let Ok(origin) = Url::parse(current_origin) else {
        // A malformed page origin cannot be compared against; be conservative.
        return ProxyDecision::relay(ClassifyReason::Unparseable);
    };
    if parsed.origin() == origin.origin() {
        ProxyDecision::no_relay(ClassifyReason::SameOrigin)
    } else {
        ProxyDecision::relay(ClassifyReason::CrossOrigin)
    }
}

fn current_scheme(current_origin: &str) -> String {
    Url::parse(current_origin)
        .map(|u| u.scheme().to_string())
        .unwrap_or_else(|_| "https".to_string())
}
