//! Transport backends for the GitLab REST API.
//!
//! Adapters talk JSON over a [`Backend`]. The production implementation is
//! [`http::HttpBackend`]; [`MockBackend`] answers from memory so adapters
//! can be tested without network access.
//!
//! ```
//! use labkit::backend::{Backend, Method, MockBackend};
//! use serde_json::json;
//!
//! let mock = MockBackend::new();
//! mock.respond(Method::Get, "users/7", json!({"id": 7, "username": "alice"}));
//!
//! let user = mock.send(Method::Get, "users/7", None).unwrap();
//! assert_eq!(user["username"], "alice");
//! assert!(mock.send(Method::Get, "users/8", None).unwrap_err().is_not_found());
//! ```

pub mod http;

use reconcile::AdapterError;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// HTTP method of an API call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Backend trait for issuing API calls.
///
/// `path` is relative to the API base and already percent-encoded. An empty
/// response body is returned as `Value::Null`.
pub trait Backend: Send + Sync {
    fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, AdapterError>;
}

/// A call recorded by [`MockBackend`]
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

type Replies = HashMap<(Method, String), VecDeque<Result<Value, AdapterError>>>;

/// Mock backend for testing without network access.
///
/// Replies are queued per method and path and consumed in order. Once a
/// queue is empty, `GET` answers `NotFound` and every other method answers
/// with an empty body.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    replies: Arc<Mutex<Replies>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn respond(&self, method: Method, path: impl Into<String>, body: Value) {
        self.enqueue(method, path.into(), Ok(body));
    }

    /// Queue a failure.
    pub fn fail(&self, method: Method, path: impl Into<String>, error: AdapterError) {
        self.enqueue(method, path.into(), Err(error));
    }

    /// Every call made so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    /// Calls made with one method.
    pub fn requests_for(&self, method: Method) -> Vec<Request> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    /// Body of the last call made with `method`.
    pub fn last_body(&self, method: Method) -> Option<Value> {
        self.requests_for(method).pop().and_then(|r| r.body)
    }

    fn enqueue(&self, method: Method, path: String, reply: Result<Value, AdapterError>) {
        lock(&self.replies)
            .entry((method, path))
            .or_default()
            .push_back(reply);
    }
}

impl Backend for MockBackend {
    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, AdapterError> {
        lock(&self.requests).push(Request {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });

        let queued = lock(&self.replies)
            .get_mut(&(method, path.to_string()))
            .and_then(VecDeque::pop_front);
        match (queued, method) {
            (Some(reply), _) => reply,
            (None, Method::Get) => Err(AdapterError::NotFound),
            (None, _) => Ok(Value::Null),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
