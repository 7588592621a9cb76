use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::sleep;

use crate::{
    error::detail_str,
    transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse},
    ApiRequest, ClientOptions, Credential, OpenCloudError, Result, RetryPolicy,
};

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://apis.roblox.com";

/// Response header giving seconds until a rate limit resets.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Async client for the Open Cloud REST API.
///
/// Configuration is immutable once built; every `with_*` method returns a
/// new value. Cloning is cheap and shares only the transport.
pub struct OpenCloudClient<T = ReqwestTransport> {
    transport: Arc<T>,
    base_url: String,
    default_headers: HeaderMap,
    credential: Option<Credential>,
    options: ClientOptions,
}

impl<T> Clone for OpenCloudClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            base_url: self.base_url.clone(),
            default_headers: self.default_headers.clone(),
            credential: self.credential.clone(),
            options: self.options.clone(),
        }
    }
}

impl<T> fmt::Debug for OpenCloudClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenCloudClient")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential)
            .field("options", &self.options)
            .finish()
    }
}

impl OpenCloudClient<ReqwestTransport> {
    /// Creates a client authenticating with an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_default_credential(Some(Credential::api_key(api_key)))
    }

    /// Creates a client authenticating with an OAuth2 access token.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added on the wire.
    pub fn with_oauth2(access_token: impl Into<String>) -> Self {
        Self::with_default_credential(Some(Credential::oauth2(access_token)))
    }

    /// Creates a client without a default credential. Each request must then
    /// carry its own via [`ApiRequest::auth`] or a scoped client.
    pub fn unauthenticated() -> Self {
        Self::with_default_credential(None)
    }

    fn with_default_credential(credential: Option<Credential>) -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new()),
            base_url: DEFAULT_BASE_URL.to_owned(),
            default_headers: HeaderMap::new(),
            credential,
            options: ClientOptions::default(),
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `OPENCLOUD_ACCESS_TOKEN`: OAuth2 access token; takes precedence
    /// - `OPENCLOUD_API_KEY`: API key, used when no access token is set
    /// - `OPENCLOUD_BASE_URL`: optional endpoint override
    ///
    /// Returns an error if no credential is set or a set variable is empty.
    pub fn from_env() -> std::result::Result<Self, String> {
        let client = match std::env::var("OPENCLOUD_ACCESS_TOKEN") {
            Ok(token) if token.trim().is_empty() => {
                return Err("OPENCLOUD_ACCESS_TOKEN is set but empty".to_owned());
            }
            Ok(token) => Self::with_oauth2(token),
            Err(_) => {
                let key = std::env::var("OPENCLOUD_API_KEY").map_err(|_| {
                    "missing OPENCLOUD_API_KEY or OPENCLOUD_ACCESS_TOKEN environment variable"
                        .to_owned()
                })?;
                if key.trim().is_empty() {
                    return Err("OPENCLOUD_API_KEY is set but empty".to_owned());
                }
                Self::new(key)
            }
        };

        match std::env::var("OPENCLOUD_BASE_URL") {
            Ok(url) if url.trim().is_empty() => {
                Err("OPENCLOUD_BASE_URL is set but empty".to_owned())
            }
            Ok(url) => Ok(client.with_base_url(url.trim())),
            Err(_) => Ok(client),
        }
    }
}

impl<T: Transport> OpenCloudClient<T> {
    /// Replaces the transport, keeping the rest of the configuration.
    pub fn with_transport<U: Transport>(self, transport: U) -> OpenCloudClient<U> {
        OpenCloudClient {
            transport: Arc::new(transport),
            base_url: self.base_url,
            default_headers: self.default_headers,
            credential: self.credential,
            options: self.options,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.options.retry = retry;
        self
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| OpenCloudError::InvalidHeader(format!("invalid header name '{name}'")))?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            OpenCloudError::InvalidHeader(format!("invalid value for header '{name}'"))
        })?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Derives a client that authenticates with `credential` instead of the
    /// default. `self` is left unchanged.
    pub fn with_credential(&self, credential: Credential) -> Self {
        Self {
            credential: Some(credential),
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Executes `request`, retrying transient failures.
    ///
    /// Returns `Ok(None)` for 204 responses and empty success bodies.
    /// Success bodies are trusted to match `R`; a mismatch is reported as
    /// [`OpenCloudError::Decode`].
    pub async fn execute<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<Option<R>> {
        let transport_request = TransportRequest {
            method: request.method.clone(),
            url: self.compose_url(&request),
            headers: self.resolve_headers(&request)?,
            body: request.body.as_ref().map(|body| body.to_string().into_bytes()),
            timeout: Duration::from_millis(self.options.timeout_ms),
        };

        let retry = &self.options.retry;
        let started = Instant::now();

        for attempt in 0..=retry.attempts {
            let response = self
                .transport
                .send(transport_request.clone())
                .await
                .map_err(OpenCloudError::Transport)?;
            let status = response.status;

            if status == 401 || status == 403 {
                let details = parse_details(&response);
                #[cfg(feature = "tracing")]
                tracing::warn!(status, path = %request.path, "request rejected as unauthorized");
                let message = detail_str(details.as_ref(), "message")
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("request rejected with status {status}"));
                return Err(OpenCloudError::auth(message, Some(status), details));
            }

            if (200..300).contains(&status) {
                return decode_success(status, &response);
            }

            if status == 429 || status >= 500 {
                let reset = if status == 429 {
                    reset_hint(&response)
                } else {
                    None
                };

                if attempt < retry.attempts {
                    let delay = reset
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| retry.delay(attempt));

                    let within_deadline = self
                        .options
                        .deadline_ms
                        .map_or(true, |deadline| {
                            started.elapsed() + delay <= Duration::from_millis(deadline)
                        });
                    if within_deadline {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            attempt,
                            status,
                            delay_ms = delay.as_millis() as u64,
                            "retrying request"
                        );
                        sleep(delay).await;
                        continue;
                    }
                }

                if status == 429 {
                    let details = parse_details(&response);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(path = %request.path, retry_after = ?reset, "rate limited");
                    let message = detail_str(details.as_ref(), "message")
                        .map(str::to_owned)
                        .unwrap_or_else(|| "rate limit exceeded".to_owned());
                    return Err(OpenCloudError::rate_limit(message, reset, details));
                }
            }

            return Err(OpenCloudError::from_response(
                status,
                parse_details(&response),
            ));
        }

        Err(OpenCloudError::RetriesExhausted {
            attempts: retry.attempts + 1,
        })
    }

    /// Joins base URL, path and encoded query.
    fn compose_url(&self, request: &ApiRequest) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = request.path.trim_start_matches('/');
        let mut url = format!("{base}/{path}");
        if !request.query.is_empty() {
            url.push('?');
            url.push_str(&request.query.encode());
        }
        url
    }

    /// Layers content type, client defaults, call overrides and credential.
    fn resolve_headers(&self, request: &ApiRequest) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        for (name, value) in &self.default_headers {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(credential) = &self.credential {
            credential.apply(&mut headers)?;
        }
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(credential) = &request.auth {
            credential.apply(&mut headers)?;
        }
        Ok(headers)
    }
}

fn decode_success<R: DeserializeOwned>(
    status: u16,
    response: &TransportResponse,
) -> Result<Option<R>> {
    if status == 204 {
        return Ok(None);
    }
    let body = response.text();
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<R>(&body).map(Some).map_err(|err| {
        OpenCloudError::Decode(format!("invalid response JSON: {err}; body: {body}"))
    })
}

/// Parses an error body as JSON, discarding anything unparseable.
fn parse_details(response: &TransportResponse) -> Option<Value> {
    serde_json::from_slice(&response.body).ok()
}

fn reset_hint(response: &TransportResponse) -> Option<u64> {
    response
        .header(RATE_LIMIT_RESET_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
