//! REST client adapter for the cluster under test.
//!
//! [`RestClient`] attaches the configured credential to every call, turns
//! non-2xx statuses into [`HttpError`], and decodes bodies into
//! [`ServerDocument`]s. It keeps no state between calls.

pub mod transport;

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::document::ServerDocument;
use crate::errors::{HarnessResult, HttpError};
pub use transport::{Transport, UreqTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username/password pair sent as HTTP basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn basic_token(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw.as_bytes()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A request as handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute path, always starting with `/`, without query string.
    pub path: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: normalize_path(path),
            params: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Ensure a leading slash; the upstream API accepts both forms but transports need one.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

pub struct RestClient {
    transport: Box<dyn Transport>,
    credentials: Credentials,
}

impl RestClient {
    pub fn new(transport: impl Transport + 'static, credentials: Credentials) -> Self {
        Self {
            transport: Box::new(transport),
            credentials,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Issue a request and decode the response body.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&str>,
    ) -> HarnessResult<ServerDocument> {
        let text = self.request_text(method, path, params, body)?;
        Ok(ServerDocument::decode(text.as_bytes())?)
    }

    /// Issue a request and return the raw body text.
    pub fn request_text(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&str>,
    ) -> HarnessResult<String> {
        let request = self.prepare(method, path, params, body);
        debug!(method = %method, path = %request.path, "cluster request");
        let response = self.transport.execute(&request)?;
        trace!(status = response.status, body = %response.body, "cluster response");

        if !response.is_success() {
            return Err(HttpError {
                method,
                path: request.path,
                status: response.status,
                body: response.body,
            }
            .into());
        }
        Ok(response.body)
    }

    pub fn get(&self, path: &str) -> HarnessResult<ServerDocument> {
        self.request(Method::Get, path, &[], None)
    }

    pub fn get_with(&self, path: &str, params: &[(&str, &str)]) -> HarnessResult<ServerDocument> {
        self.request(Method::Get, path, params, None)
    }

    pub fn put_json(&self, path: &str, body: &str) -> HarnessResult<ServerDocument> {
        self.request(Method::Put, path, &[], Some(body))
    }

    pub fn post(&self, path: &str) -> HarnessResult<ServerDocument> {
        self.request(Method::Post, path, &[], None)
    }

    pub fn post_with(&self, path: &str, params: &[(&str, &str)]) -> HarnessResult<ServerDocument> {
        self.request(Method::Post, path, params, None)
    }

    fn prepare(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&str>,
    ) -> HttpRequest {
        let mut request = HttpRequest::new(method, path);
        request.params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        request
            .headers
            .push(("Authorization".to_string(), self.credentials.basic_token()));
        if let Some(body) = body {
            request
                .headers
                .push(("Content-Type".to_string(), "application/json".to_string()));
            request.body = Some(body.to_string());
        }
        request
    }
}
