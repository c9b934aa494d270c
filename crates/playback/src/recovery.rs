// Error recovery policy: the single place that turns engine error events
// into retry/recover/fail decisions. Call sites never schedule their own
// retries.

use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{ErrorEvent, ErrorKind};

/// What the controller should do about one error event.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Non-fatal: log and move on, no state transition.
    Observe,
    /// Schedule one `start_load()` after the given delay.
    RetryAfter(Duration),
    /// Invoke the engine's built-in media-error recovery.
    RecoverMedia,
    /// Surface a terminal failure to the UI collaborator.
    Fatal(String),
}

/// Mutable per-session bookkeeping owned by the session, fed to the policy.
#[derive(Debug, Default)]
pub struct SessionCounters {
    /// Consecutive fatal network retries performed so far.
    pub retry_count: u32,
    /// Whether the one-shot media recovery has been spent.
    pub media_recovery_used: bool,
    pub last_error_kind: Option<ErrorKind>,
}

impl SessionCounters {
    /// Forward progress resets the network retry budget.
    pub fn note_progress(&mut self) {
        self.retry_count = 0;
    }
}

pub struct RecoveryPolicy {
    retry: RetryConfig,
}

impl RecoveryPolicy {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    /// Decide the outcome for one error event, updating the session counters.
    pub fn decide(&self, event: &ErrorEvent, counters: &mut SessionCounters) -> RecoveryAction {
        if !event.fatal {
            warn!(kind = ?event.kind, detail = %event.detail, "Non-fatal engine error");
            return RecoveryAction::Observe;
        }

        counters.last_error_kind = Some(event.kind);

        match event.kind {
            ErrorKind::Configuration => RecoveryAction::Fatal(format!(
                "This runtime cannot play the stream format: {}",
                event.detail
            )),
            ErrorKind::Media => {
                if counters.media_recovery_used {
                    RecoveryAction::Fatal(
                        "Media error persisted after recovery; the stream may be corrupt"
                            .to_string(),
                    )
                } else {
                    counters.media_recovery_used = true;
                    RecoveryAction::RecoverMedia
                }
            }
            // Relay-reported upstream failures follow the network rules.
            ErrorKind::Network | ErrorKind::Relay => {
                if event.is_relay_blocked() {
                    // A zero-status failure on an already relayed fragment or
                    // key fetch is a hard network/config problem; retrying
                    // through the same relay cannot succeed.
                    return RecoveryAction::Fatal(
                        "Cross-origin access blocked; check the relay and server CORS configuration"
                            .to_string(),
                    );
                }
                if counters.retry_count < self.retry.max_retries {
                    counters.retry_count += 1;
                    RecoveryAction::RetryAfter(self.retry.delay_for_attempt(counters.retry_count))
                } else {
                    RecoveryAction::Fatal(
                        "Unable to load the video stream; check the network connection or the stream URL"
                            .to_string(),
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ResourceKind;

    fn policy() -> RecoveryPolicy {
        RecoveryPolicy::new(RetryConfig::default())
    }

    #[test]
    fn non_fatal_errors_are_observed_only() {
        let mut counters = SessionCounters::default();
        let event = ErrorEvent::network(false, "transient hiccup");
        assert_eq!(
            policy().decide(&event, &mut counters),
            RecoveryAction::Observe
        );
        assert_eq!(counters.retry_count, 0);
        assert!(counters.last_error_kind.is_none());
    }

    #[test]
    fn network_errors_retry_with_linear_backoff_then_fail_once() {
        let policy = policy();
        let mut counters = SessionCounters::default();
        let event = ErrorEvent::network(true, "fetch failed").with_status(503);

        assert_eq!(
            policy.decide(&event, &mut counters),
            RecoveryAction::RetryAfter(Duration::from_millis(1000))
        );
        assert_eq!(
            policy.decide(&event, &mut counters),
            RecoveryAction::RetryAfter(Duration::from_millis(2000))
        );
        assert_eq!(
            policy.decide(&event, &mut counters),
            RecoveryAction::RetryAfter(Duration::from_millis(3000))
        );
        // Attempt 4: budget exhausted, no further retry is scheduled.
        assert!(matches!(
            policy.decide(&event, &mut counters),
            RecoveryAction::Fatal(_)
        ));
        assert_eq!(counters.retry_count, 3);
    }

    #[test]
    fn progress_resets_the_retry_budget() {
        let policy = policy();
        let mut counters = SessionCounters::default();
        let event = ErrorEvent::network(true, "fetch failed").with_status(502);

        for _ in 0..3 {
            policy.decide(&event, &mut counters);
        }
        counters.note_progress();
        assert_eq!(
            policy.decide(&event, &mut counters),
            RecoveryAction::RetryAfter(Duration::from_millis(1000))
        );
    }

    #[test]
    fn relay_blocked_failures_surface_without_retry() {
        let mut counters = SessionCounters::default();
        let mut event = ErrorEvent::network(true, "code 0 on fragment")
            .with_resource(ResourceKind::Segment);
        event.relayed = true;

        assert!(matches!(
            policy().decide(&event, &mut counters),
            RecoveryAction::Fatal(_)
        ));
        assert_eq!(counters.retry_count, 0);
    }

    #[test]
    fn zero_status_without_relay_still_retries() {
        // Not yet relayed: an ordinary transport failure keeps its retry
        // budget.
        let mut counters = SessionCounters::default();
        let event = ErrorEvent::network(true, "connection reset")
            .with_resource(ResourceKind::Segment);
        assert!(matches!(
            policy().decide(&event, &mut counters),
            RecoveryAction::RetryAfter(_)
        ));
    }

    #[test]
    fn media_recovery_fires_at_most_once() {
        let policy = policy();
        let mut counters = SessionCounters::default();
        let event = ErrorEvent::media(true, "buffer append error");

        assert_eq!(
            policy.decide(&event, &mut counters),
            RecoveryAction::RecoverMedia
        );
        assert!(matches!(
            policy.decide(&event, &mut counters),
            RecoveryAction::Fatal(_)
        ));
    }

    #[test]
    fn configuration_errors_never_retry() {
        let mut counters = SessionCounters::default();
        let event = ErrorEvent::configuration("no adaptive-streaming support");
        assert!(matches!(
            policy().decide(&event, &mut counters),
            RecoveryAction::Fatal(_)
        ));
        assert_eq!(counters.retry_count, 0);
    }

    #[test]
    fn relay_kind_follows_network_rules() {
        let mut counters = SessionCounters::default();
        let mut event = ErrorEvent::new(ErrorKind::Relay, true, "upstream 404 via relay");
        event.status = Some(500);
        event.relayed = true;
        assert!(matches!(
            policy().decide(&event, &mut counters),
            RecoveryAction::RetryAfter(_)
        ));
    }
}
