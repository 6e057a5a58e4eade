//! Error vocabulary shared by every external call
//!
//! Each client maps its wire-level failures into `ServiceError`; the retry
//! policies in `resilience` classify these without knowing the client.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Non-success HTTP status
    #[error("{service} returned HTTP {status}: {message}")]
    Http {
        service: &'static str,
        status: u16,
        /// Machine-readable reason (e.g. Google `errors[0].reason`)
        reason: Option<String>,
        /// Server-provided wait hint
        retry_after: Option<Duration>,
        message: String,
    },

    /// Error code reported inside a successful HTTP response
    #[error("{service} error {code}: {message}")]
    Api {
        service: &'static str,
        code: i64,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("{service} transport error: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} response could not be decoded: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    #[error("{service} credentials unavailable: {message}")]
    Auth {
        service: &'static str,
        message: String,
    },

    #[error("{service} i/o error: {source}")]
    Io {
        service: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ServiceError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Http { status, .. } => Some(*status),
            ServiceError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ServiceError::Http { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ServiceError::Http { retry_after, .. } | ServiceError::Api { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }

    pub(crate) fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| ServiceError::Transport { service, source }
    }

    pub(crate) fn decode(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |e| ServiceError::Decode {
            service,
            message: e.to_string(),
        }
    }

    /// Parse a `Retry-After` header given in seconds
    pub(crate) fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Shorthand used by tests and fakes
    pub fn http(service: &'static str, status: u16) -> Self {
        ServiceError::Http {
            service,
            status,
            reason: None,
            retry_after: None,
            message: format!("status {}", status),
        }
    }
}
