use crate::Error;
use std::time::Duration;

/// Body marker of the upstream's anti-bot interstitial page.
const BLOCK_SIGNATURE: &str = "Attention Required! | Cloudflare";
const BLOCK_MESSAGE: &str = "Cloudflare 403";

/// What an attempt produced, as seen by the classifier.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Outcome<'a> {
    /// No response: transport, token or local failure.
    Error(&'a Error),
    /// The upstream answered with a non-success status.
    Status(u16),
}

/// Final classification of a failure that will not be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
    Transport,
    Token,
    AccessDenied,
    Upstream,
    Cancelled,
    Local,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Token => "token",
            FailureKind::AccessDenied => "access_denied",
            FailureKind::Upstream => "upstream",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Local => "local",
        }
    }
}

/// Internal decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Back off for `delay`, then try again. With `refresh_identity` the fingerprint
    /// is regenerated and the token cache invalidated first.
    Retry {
        delay: Duration,
        refresh_identity: bool,
    },
    Fail(FailureKind),
}

/// Orchestrator states. Transitions are driven by [`PolicyEngine::classify`].
#[derive(Debug)]
pub(crate) enum AttemptState<T> {
    Attempting {
        attempt: u32,
    },
    Backoff {
        attempt: u32,
        delay: Duration,
        refresh_identity: bool,
    },
    Success(T),
    /// Terminal state for a backoff past the budget. `classify` only retries while
    /// attempts remain, so the last attempt fails with its own classification and
    /// this state stays unreachable unless the budget check there changes.
    Exhausted,
}

/// Retry policy for the request orchestrator.
///
/// Keep this pure: the same outcome at the same attempt always yields the same
/// decision, and deciding has no side effects.
pub(crate) struct PolicyEngine {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl PolicyEngine {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    /// Linear backoff: `attempt` units after the `attempt`-th failure.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }

    /// Classify a failed attempt. `attempt` is 1-based.
    pub fn classify(&self, outcome: Outcome<'_>, attempt: u32) -> Decision {
        let attempts_left = attempt < self.max_attempts;
        let retry = |refresh_identity| Decision::Retry {
            delay: self.backoff_delay(attempt),
            refresh_identity,
        };

        match outcome {
            Outcome::Status(403) if attempts_left => retry(true),
            Outcome::Status(403) => Decision::Fail(FailureKind::AccessDenied),
            Outcome::Status(_) => Decision::Fail(FailureKind::Upstream),
            Outcome::Error(err) if err.is_retryable() && attempts_left => retry(false),
            Outcome::Error(err) => Decision::Fail(match err {
                Error::Transport(_) => FailureKind::Transport,
                Error::TokenAcquisition { .. } | Error::Evaluation(_) => FailureKind::Token,
                Error::Cancelled => FailureKind::Cancelled,
                _ => FailureKind::Local,
            }),
        }
    }

    /// State after a backoff at `attempt` has elapsed. Rechecks the budget
    /// independently of [`classify`](Self::classify).
    pub fn after_backoff<T>(&self, attempt: u32) -> AttemptState<T> {
        if attempt < self.max_attempts {
            AttemptState::Attempting {
                attempt: attempt + 1,
            }
        } else {
            AttemptState::Exhausted
        }
    }
}

/// Build the caller-facing error for a non-success upstream status.
pub(crate) fn upstream_error(status: u16, body: &str) -> Error {
    let mut message = body.trim().to_string();
    if message.contains(BLOCK_SIGNATURE) {
        message = BLOCK_MESSAGE.to_string();
    }
    if status == 403 {
        Error::AccessDenied { message }
    } else {
        Error::Upstream { status, message }
    }
}
