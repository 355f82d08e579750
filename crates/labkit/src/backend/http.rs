//! HTTP backend for a GitLab instance.
//!
//! Requests carry the access token in the `PRIVATE-TOKEN` header. Status
//! codes are inspected here rather than surfaced by `ureq`, so a 404 can be
//! reported as a missing entity with the server's own message.

use crate::backend::{Backend, Method};
use crate::error::{Error, Result, status_error, transport_error};
use reconcile::AdapterError;
use serde_json::Value;
use std::time::Duration;

/// Default API root for gitlab.com.
pub const DEFAULT_API_BASE: &str = "https://gitlab.com/api/v4";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking HTTP backend.
pub struct HttpBackend {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// API base URL, without a trailing slash.
    api_base: String,
    /// Personal, project or group access token.
    token: Option<String>,
}

impl HttpBackend {
    /// Create a backend for the given API base.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBaseUrl` unless the URL is http or https.
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Result<Self> {
        let api_base = normalize_base(api_base.into())?;
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        Ok(Self {
            agent: ureq::Agent::new_with_config(config),
            api_base,
            token,
        })
    }

    /// Get the current API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Build the full URL for an API path.
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request
            .header("Accept", "application/json")
            .header("User-Agent", "gitform");
        match &self.token {
            Some(token) => request.header("PRIVATE-TOKEN", token),
            None => request,
        }
    }
}

impl Backend for HttpBackend {
    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<Value, AdapterError> {
        let url = self.url(path);
        log::debug!("{method} {url}");

        let sent = match (method, body) {
            (Method::Get, _) => self.authorize(self.agent.get(&url)).call(),
            (Method::Delete, _) => self.authorize(self.agent.delete(&url)).call(),
            (Method::Post, Some(body)) => self.authorize(self.agent.post(&url)).send_json(body),
            (Method::Post, None) => self.authorize(self.agent.post(&url)).send_empty(),
            (Method::Put, Some(body)) => self.authorize(self.agent.put(&url)).send_json(body),
            (Method::Put, None) => self.authorize(self.agent.put(&url)).send_empty(),
        };
        let mut response = sent.map_err(transport_error)?;
        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string().map_err(transport_error)?;
        log::trace!("{method} {url} -> {status}");

        if !(200..300).contains(&status) {
            return Err(status_error(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| AdapterError::decode(format!("{method} {path}: {e}")))
    }
}

fn normalize_base(url: String) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(Error::InvalidBaseUrl {
            url,
            reason: "expected an http or https URL".to_string(),
        });
    }
    if trimmed.split_once("://").is_some_and(|(_, host)| host.is_empty()) {
        return Err(Error::InvalidBaseUrl {
            url,
            reason: "missing host".to_string(),
        });
    }
    Ok(trimmed.to_string())
}
