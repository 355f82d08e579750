//! Typed JSON client shared by every adapter

use crate::backend::http::{DEFAULT_API_BASE, HttpBackend};
use crate::backend::{Backend, Method};
use crate::error::Result;
use reconcile::AdapterError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Cheap-to-clone handle on a [`Backend`].
#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn Backend>,
}

impl Client {
    /// Create a client for a GitLab instance.
    ///
    /// # Errors
    ///
    /// Returns an error if `api_base` is not an http(s) URL.
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Result<Self> {
        Ok(Self::with_backend(Arc::new(HttpBackend::new(api_base, token)?)))
    }

    /// Create a client for gitlab.com.
    pub fn gitlab_com(token: Option<String>) -> Result<Self> {
        Self::new(DEFAULT_API_BASE, token)
    }

    /// Create a client with a custom backend (useful for testing).
    #[must_use]
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, AdapterError> {
        decode(self.backend.send(Method::Get, path, None)?, Method::Get, path)
    }

    pub fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> std::result::Result<T, AdapterError> {
        decode(self.backend.send(Method::Post, path, Some(body))?, Method::Post, path)
    }

    pub fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> std::result::Result<T, AdapterError> {
        decode(self.backend.send(Method::Put, path, Some(body))?, Method::Put, path)
    }

    /// PUT whose response body is not needed.
    pub fn put_unit(&self, path: &str, body: &Value) -> std::result::Result<(), AdapterError> {
        self.backend.send(Method::Put, path, Some(body)).map(|_| ())
    }

    pub fn delete(&self, path: &str) -> std::result::Result<(), AdapterError> {
        self.backend.send(Method::Delete, path, None).map(|_| ())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

fn decode<T: DeserializeOwned>(
    value: Value,
    method: Method,
    path: &str,
) -> std::result::Result<T, AdapterError> {
    serde_json::from_value(value).map_err(|e| AdapterError::decode(format!("{method} {path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    #[test]
    fn test_client_decodes_responses() {
        let mock = MockBackend::new();
        mock.respond(Method::Get, "groups/7", json!({"name": "platform", "id": 7}));
        let client = Client::with_backend(Arc::new(mock));

        let group: Named = client.get("groups/7").unwrap();
        assert_eq!(group.name, "platform");
    }

    #[test]
    fn test_client_reports_decode_errors() {
        let mock = MockBackend::new();
        mock.respond(Method::Post, "groups", json!({"id": 7}));
        let client = Client::with_backend(Arc::new(mock));

        let err = client.post::<Named>("groups", &json!({})).unwrap_err();
        assert!(matches!(err, AdapterError::Decode { .. }));
        assert!(err.to_string().contains("POST groups"));
    }

    #[test]
    fn test_client_passes_errors_through() {
        let mock = MockBackend::new();
        let client = Client::with_backend(Arc::new(mock.clone()));
        assert!(client.get::<Named>("groups/1").unwrap_err().is_not_found());
        client.delete("groups/1").unwrap();
        assert_eq!(mock.requests().len(), 2);
    }

    #[test]
    fn test_gitlab_com_client() {
        assert!(Client::gitlab_com(None).is_ok());
        assert!(Client::new("not a url", None).is_err());
    }
}
