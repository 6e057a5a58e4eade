//! Classification tables for the three external dependencies
//!
//! Each dependency has its own vocabulary for "slow down" and a different cost
//! of over-retrying, so they are kept as separate tables.

use std::time::Duration;

use super::{RetryPolicy, Verdict};
use crate::error::ServiceError;

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(64);
const BACKOFF_JITTER: Duration = Duration::from_secs(1);

/// Google quota reasons that arrive as 403 but mean "rate limited"
const SHEETS_QUOTA_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "sharingRateLimitExceeded",
    "dailyLimitExceeded",
];

const SERVER_ERRORS: &[u16] = &[500, 502, 503, 504];

/// Bybit in-body codes for request-rate limits
const EXCHANGE_RATE_LIMIT_CODES: &[i64] = &[10006, 10018];

/// Extra second on top of Telegram's flood-wait hint
const FLOOD_WAIT_MARGIN: Duration = Duration::from_secs(1);
const EXCHANGE_DEFAULT_WAIT: Duration = Duration::from_secs(1);

pub fn classify_sheets(err: &ServiceError) -> Verdict {
    match err.status() {
        Some(400) | Some(404) => Verdict::Skip,
        Some(401) => Verdict::RefreshThenRetry,
        Some(429) => Verdict::Backoff,
        Some(s) if SERVER_ERRORS.contains(&s) => Verdict::Backoff,
        Some(403) if err.reason().is_some_and(|r| SHEETS_QUOTA_REASONS.contains(&r)) => {
            Verdict::Backoff
        }
        _ => Verdict::Fail,
    }
}

pub fn classify_telegram(err: &ServiceError) -> Verdict {
    match (err.status(), err.retry_after()) {
        (Some(429), Some(wait)) => Verdict::Wait(wait + FLOOD_WAIT_MARGIN),
        _ => Verdict::Backoff,
    }
}

pub fn classify_exchange(err: &ServiceError) -> Verdict {
    if let ServiceError::Api { code, .. } = err {
        if EXCHANGE_RATE_LIMIT_CODES.contains(code) {
            return Verdict::Wait(err.retry_after().unwrap_or(EXCHANGE_DEFAULT_WAIT));
        }
        return Verdict::Fail;
    }
    match err.status() {
        Some(429) => Verdict::Wait(err.retry_after().unwrap_or(EXCHANGE_DEFAULT_WAIT)),
        Some(s) if SERVER_ERRORS.contains(&s) => Verdict::Backoff,
        _ => Verdict::Fail,
    }
}

fn policy(name: &'static str, classify: super::Classifier) -> RetryPolicy {
    RetryPolicy {
        name,
        classify,
        max_attempts: MAX_ATTEMPTS,
        base: BACKOFF_BASE,
        cap: BACKOFF_CAP,
        jitter: BACKOFF_JITTER,
    }
}

pub fn sheets() -> RetryPolicy {
    policy("sheets", classify_sheets)
}

pub fn telegram() -> RetryPolicy {
    policy("telegram", classify_telegram)
}

pub fn exchange() -> RetryPolicy {
    policy("exchange", classify_exchange)
}
