use serde_json::Value;

use crate::transport::TransportError;

/// Machine code carried by every [`OpenCloudError::RateLimit`].
pub const RATE_LIMIT_CODE: &str = "rate_limited";

/// Machine code carried by every [`OpenCloudError::Auth`].
pub const AUTH_CODE: &str = "unauthorized";

/// Error type returned by this crate.
///
/// `Api`, `RateLimit` and `Auth` are produced from HTTP status handling.
/// The remaining variants mark boundaries the API status codes do not
/// cover: transport failures, undecodable success bodies and unusable
/// request input.
#[derive(Debug, thiserror::Error)]
pub enum OpenCloudError {
    /// Non-success response that is neither an auth nor a terminal rate-limit
    /// failure.
    #[error("api error{}: {message}", fmt_status(.status))]
    Api {
        /// Human-readable message, taken from the response body when present.
        message: String,
        /// HTTP status code of the failing response.
        status: Option<u16>,
        /// Machine error code extracted from the response body.
        code: Option<String>,
        /// Response body parsed as JSON, if it was parseable.
        details: Option<Value>,
    },
    /// HTTP 429 after retries were exhausted.
    #[error("rate limited (retry after {retry_after:?}s): {message}")]
    RateLimit {
        message: String,
        /// Seconds until the server resets the limit, if it said so.
        retry_after: Option<u64>,
        details: Option<Value>,
    },
    /// HTTP 401 or 403. Never retried.
    #[error("authentication failed ({status}): {message}")]
    Auth {
        message: String,
        status: u16,
        details: Option<Value>,
    },
    /// The attempt loop ended without a terminal outcome.
    #[error("request failed after {attempts} attempts without a successful response")]
    RetriesExhausted { attempts: usize },
    /// Failure raised by the transport itself, passed through untouched.
    #[error("transport error: {0}")]
    Transport(TransportError),
    /// A successful response body did not match the expected JSON shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// Request body could not be serialized to JSON.
    #[error("encode error: {0}")]
    Encode(String),
    /// A header name or value cannot be sent on the wire.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|status| format!(" {status}")).unwrap_or_default()
}

impl OpenCloudError {
    /// Builds the base API error kind.
    pub fn api(
        message: impl Into<String>,
        status: Option<u16>,
        code: Option<String>,
        details: Option<Value>,
    ) -> Self {
        Self::Api {
            message: message.into(),
            status,
            code,
            details,
        }
    }

    /// Builds a rate-limit error. Status and code are fixed.
    pub fn rate_limit(
        message: impl Into<String>,
        retry_after: Option<u64>,
        details: Option<Value>,
    ) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
            details,
        }
    }

    /// Builds an auth error. `status` falls back to 401 when absent.
    pub fn auth(message: impl Into<String>, status: Option<u16>, details: Option<Value>) -> Self {
        Self::Auth {
            message: message.into(),
            status: status.unwrap_or(401),
            details,
        }
    }

    /// Builds the terminal error for a failing response from its parsed body.
    pub(crate) fn from_response(status: u16, details: Option<Value>) -> Self {
        let message = detail_str(details.as_ref(), "message")
            .map(str::to_owned)
            .unwrap_or_else(|| format!("request failed with status {status}"));
        let code = detail_str(details.as_ref(), "code")
            .or_else(|| detail_str(details.as_ref(), "error"))
            .map(str::to_owned);
        Self::api(message, Some(status), code, details)
    }

    pub fn message(&self) -> String {
        match self {
            Self::Api { message, .. }
            | Self::RateLimit { message, .. }
            | Self::Auth { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            Self::RateLimit { .. } => Some(429),
            Self::Auth { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine error code associated with this error, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            Self::RateLimit { .. } => Some(RATE_LIMIT_CODE),
            Self::Auth { .. } => Some(AUTH_CODE),
            _ => None,
        }
    }

    /// Parsed response body of the failing request.
    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Api { details, .. }
            | Self::RateLimit { details, .. }
            | Self::Auth { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }
}

pub(crate) fn detail_str<'a>(details: Option<&'a Value>, field: &str) -> Option<&'a str> {
    details?.get(field)?.as_str()
}
