use std::{future::Future, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};

/// Error raised by a [`Transport`] implementation.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Fully resolved HTTP request handed to a [`Transport`].
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

/// Raw HTTP response returned by a [`Transport`].
#[derive(Clone, Debug, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends one HTTP request.
///
/// This is the only network seam of the client. Implementations must be
/// `Send + Sync` so a client can be shared across tasks.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a preconfigured `reqwest::Client` (proxies, TLS, pooling).
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .http
            .request(request.method, &request.url)
            .headers(request.headers)
            .timeout(request.timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
