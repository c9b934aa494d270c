use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Where the relay service is mounted, from the player's point of view.
///
/// The base path is same-origin by construction (root-relative), which is
/// what makes a second classification of an already rewritten URL resolve to
/// "no relay" and prevents proxy chaining.
#[derive(Debug, Clone)]
pub struct RelayRoute {
    /// Root-relative mount point of the relay endpoint, e.g. `/relay`.
    pub base_path: String,
    /// Optional safe-path prefix. When set, requests use the path form
    /// `{base_path}/{prefix}/{percent-encoded-url}` instead of the query
    /// form, matching a relay running with the safe-path allow-list enabled.
    pub safe_path: Option<String>,
}

impl Default for RelayRoute {
    fn default() -> Self {
        Self {
            base_path: "/relay".to_string(),
            safe_path: None,
        }
    }
}

impl RelayRoute {
    /// Compute the rewritten request target for `original_url`.
    pub fn target_for(&self, original_url: &str) -> String {
        let encoded = urlencoding::encode(original_url);
        match &self.safe_path {
            Some(prefix) => format!("{}/{}/{}", self.base_path, prefix, encoded),
            None => format!("{}?url={}", self.base_path, encoded),
        }
    }
}

/// Network retry knobs consumed by the recovery policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retry attempts for fatal network errors.
    pub max_retries: u32,
    /// Base delay; attempt `n` (1-indexed) waits `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    /// Linear backoff: 1s, 2s, 3s for the default configuration.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.max(1))
    }
}

/// Transport timeouts for the pass-through loader, per resource kind.
#[derive(Debug, Clone)]
pub struct LoaderTimeouts {
    pub manifest: Duration,
    pub segment: Duration,
    pub key: Duration,
}

impl Default for LoaderTimeouts {
    fn default() -> Self {
        Self {
            manifest: Duration::from_secs(10),
            segment: Duration::from_secs(30),
            key: Duration::from_secs(10),
        }
    }
}

/// Top-level player configuration supplied by the hosting application.
#[derive(Debug, Clone, Default)]
pub struct PlayerConfig {
    /// Origin of the hosting page, e.g. `https://site.example`.
    pub origin: String,
    /// Relay mount configuration.
    pub relay: RelayRoute,
    /// Retry policy for fatal network errors.
    pub retry: RetryConfig,
    /// Transport timeouts.
    pub timeouts: LoaderTimeouts,
}

impl PlayerConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_form_target_percent_encodes() {
        let route = RelayRoute::default();
        assert_eq!(
            route.target_for("https://cdn.other.example/a b.ts"),
            "/relay?url=https%3A%2F%2Fcdn.other.example%2Fa%20b.ts"
        );
    }

    #[test]
    fn safe_path_form_target() {
        let route = RelayRoute {
            base_path: "/relay".to_string(),
            safe_path: Some("media".to_string()),
        };
        assert_eq!(
            route.target_for("https://cdn.other.example/a.ts"),
            "/relay/media/https%3A%2F%2Fcdn.other.example%2Fa.ts"
        );
    }

    #[test]
    fn linear_backoff_delays() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(3000));
    }
}
