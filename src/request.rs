use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};
use serde::Serialize;
use serde_json::Value;

use crate::{Credential, OpenCloudError, Result};

/// Query parameters with set-replaces semantics.
///
/// Pairs keep insertion order so the encoded query string is deterministic.
/// Setting a name that already exists overwrites its value in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl ToString) {
        let name = name.into();
        let value = value.to_string();
        match self.pairs.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.pairs.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Form-url-encodes the pairs, without a leading `?`.
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.pairs)
            .finish()
    }
}

/// One logical request against the API.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) body: Option<Value>,
    pub(crate) query: Query,
    pub(crate) headers: HeaderMap,
    pub(crate) auth: Option<Credential>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: Query::new(),
            headers: HeaderMap::new(),
            auth: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Sets a query parameter, replacing any earlier value for `name`.
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.set(name, value);
        self
    }

    /// Like [`ApiRequest::query`], skipping `None`.
    pub fn query_opt<V: ToString>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(name, value),
            None => self,
        }
    }

    /// Serializes `body` as the JSON request body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|err| OpenCloudError::Encode(format!("invalid request body: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Adds a call-specific header that overrides the client defaults.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| OpenCloudError::InvalidHeader(format!("invalid header name '{name}'")))?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            OpenCloudError::InvalidHeader(format!("invalid value for header '{name}'"))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Uses `credential` for this call only, replacing the client default.
    pub fn auth(mut self, credential: Credential) -> Self {
        self.auth = Some(credential);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_params(&self) -> &Query {
        &self.query
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}
