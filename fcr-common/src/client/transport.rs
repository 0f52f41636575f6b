//! Transport seam between the REST client and the network.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{HttpRequest, Method, RawResponse};
use crate::errors::TransportError;

/// Executes a fully prepared request and returns whatever status came back.
///
/// Implementations must not treat non-2xx statuses as errors; status
/// classification belongs to [`super::RestClient`].
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Blocking HTTP transport backed by a `ureq` agent.
///
/// One agent is shared across calls; connections are pooled by the agent and
/// released when each response body has been read to the end.
pub struct UreqTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent: config.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn failure(request: &HttpRequest, err: impl std::fmt::Display) -> TransportError {
        TransportError {
            method: request.method,
            path: request.path.clone(),
            message: err.to_string(),
        }
    }
}

fn decorate<B>(mut builder: ureq::RequestBuilder<B>, request: &HttpRequest) -> ureq::RequestBuilder<B> {
    for (key, value) in &request.params {
        builder = builder.query(key, value);
    }
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let url = self.url_for(&request.path);
        debug!(method = %request.method, url = %url, "sending request");

        let result = match request.method {
            Method::Get => decorate(self.agent.get(&url), request).call(),
            Method::Head => decorate(self.agent.head(&url), request).call(),
            Method::Delete => decorate(self.agent.delete(&url), request).call(),
            Method::Put | Method::Post => {
                let builder = match request.method {
                    Method::Put => self.agent.put(&url),
                    _ => self.agent.post(&url),
                };
                let builder = decorate(builder, request);
                match &request.body {
                    Some(body) => builder.send(body.as_str()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(|err| Self::failure(request, err))?;
        let status = response.status().as_u16();
        let body = if request.method == Method::Head {
            String::new()
        } else {
            response
                .body_mut()
                .read_to_string()
                .map_err(|err| Self::failure(request, err))?
        };
        debug!(method = %request.method, path = %request.path, status, "response received");
        Ok(RawResponse { status, body })
    }
}
