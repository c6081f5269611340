use std::time::Duration;

use rl_domain::error::Error;

/// Map a transport error to the domain error space.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Exponential backoff for idempotent transport retries: 250ms, 500ms, 1s…
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(250u64.saturating_mul(1 << attempt.min(4)))
}

/// Whether a failed call may be retried: transport-level failures and 5xx
/// responses only. 4xx means the request itself is wrong.
pub(crate) fn retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
}
