use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

use crate::{OpenCloudError, Result};

/// Header carrying an API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Credential attached to outbound requests.
///
/// The two variants use different headers and are mutually exclusive on a
/// single request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Opaque API key, sent as `x-api-key: <key>`.
    ApiKey(String),
    /// OAuth2 access token, sent as `Authorization: Bearer <token>`.
    OAuth2 { access_token: String },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.debug_tuple("ApiKey").field(&"<redacted>").finish(),
            Self::OAuth2 { .. } => f
                .debug_struct("OAuth2")
                .field("access_token", &"<redacted>")
                .finish(),
        }
    }
}

impl Credential {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(key.into())
    }

    pub fn oauth2(access_token: impl Into<String>) -> Self {
        Self::OAuth2 {
            access_token: access_token.into(),
        }
    }

    /// Wire header for this credential. The value is marked sensitive.
    pub fn header(&self) -> Result<(HeaderName, HeaderValue)> {
        let (name, raw) = match self {
            Self::ApiKey(key) => (
                HeaderName::from_static(API_KEY_HEADER),
                key.trim().to_owned(),
            ),
            Self::OAuth2 { access_token } => {
                (AUTHORIZATION, normalize_bearer_authorization(access_token))
            }
        };
        let mut value = HeaderValue::from_str(&raw).map_err(|_| {
            OpenCloudError::InvalidHeader(format!("credential for '{name}' is not a valid header value"))
        })?;
        value.set_sensitive(true);
        Ok((name, value))
    }

    /// Removes every credential header from `headers`, whichever variant set it.
    pub(crate) fn strip(headers: &mut HeaderMap) {
        headers.remove(API_KEY_HEADER);
        headers.remove(AUTHORIZATION);
    }

    /// Replaces any credential in `headers` with this one.
    pub(crate) fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        let (name, value) = self.header()?;
        Self::strip(headers);
        headers.insert(name, value);
        Ok(())
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
