//! `opencloud-http` is an async client for the Open Cloud REST API.
//!
//! Every call goes through [`OpenCloudClient::execute`], which resolves
//! headers and credentials, retries rate-limited and server-failed
//! requests with backoff, and turns failures into [`OpenCloudError`].
//! Resource helpers such as [`OpenCloudClient::get_user`] are thin
//! wrappers over it.

mod auth;
mod client;
mod error;
pub mod field_mask;
mod options;
mod request;
mod resources;
mod transport;

pub use auth::{Credential, API_KEY_HEADER};
pub use client::{OpenCloudClient, DEFAULT_BASE_URL, RATE_LIMIT_RESET_HEADER};
pub use error::{OpenCloudError, AUTH_CODE, RATE_LIMIT_CODE};
pub use options::{Backoff, ClientOptions, RetryPolicy};
pub use request::{ApiRequest, Query};
pub use resources::ListOptions;
pub use transport::{
    ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse,
};

pub type Result<T> = std::result::Result<T, OpenCloudError>;
