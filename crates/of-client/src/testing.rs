//! In-memory transport with canned responses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use of_types::{ObjFunError, ObjFunResult};

use crate::proxy::{ApiResponse, Transport};

/// A request seen by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub method: &'static str,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

#[derive(Default)]
struct Script {
    responses: HashMap<(&'static str, String), ApiResponse>,
    requests: Vec<Recorded>,
}

/// Transport answering from a table of `(method, path)` responses.
///
/// Clones share the same table, so a test can keep a handle after boxing
/// one into an objective function and register further responses.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the response for `method` and `path`.
    pub fn on(&self, method: &'static str, path: &str, status: u16, body: serde_json::Value) -> &Self {
        let body = if body.is_null() {
            String::new()
        } else {
            body.to_string()
        };
        self.script
            .lock()
            .unwrap()
            .responses
            .insert((method, path.to_string()), ApiResponse::new(status, body));
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.script.lock().unwrap().requests.clone()
    }

    /// Requests sent to `path` with any method.
    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    fn respond(
        &self,
        method: &'static str,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> ObjFunResult<ApiResponse> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(Recorded {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });
        script
            .responses
            .get(&(method, path.to_string()))
            .cloned()
            .ok_or_else(|| ObjFunError::Transport(format!("no response registered for {method} {path}")))
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, path: &str) -> ObjFunResult<ApiResponse> {
        self.respond("GET", path, None)
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> ObjFunResult<ApiResponse> {
        self.respond("POST", path, Some(body))
    }

    fn put(&self, path: &str, body: &serde_json::Value) -> ObjFunResult<ApiResponse> {
        self.respond("PUT", path, Some(body))
    }
}
