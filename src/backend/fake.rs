//! In-memory backend for handler tests.

use super::SearchBackend;
use crate::error::BackendError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

/// A recorded backend call. `body` is `Null` for GETs.
#[derive(Debug, Clone)]
pub struct Call {
    pub path: String,
    pub body: Value,
}

/// Answers each call with the first responder that returns `Some`, or an
/// empty hit list when none does.
#[derive(Default)]
pub struct FakeBackend {
    responders: Vec<Responder>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str, &Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.responders.push(Box::new(responder));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn answer(&self, path: &str, body: Value) -> Value {
        let reply = self
            .responders
            .iter()
            .find_map(|r| r(path, &body))
            .unwrap_or_else(|| hits(&[]));
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call {
                path: path.to_string(),
                body,
            });
        }
        reply
    }
}

#[async_trait]
impl SearchBackend for FakeBackend {
    async fn get(&self, path: &str, _timeout: Duration) -> Result<Value, BackendError> {
        Ok(self.answer(path, Value::Null))
    }

    async fn post(
        &self,
        path: &str,
        body: &Value,
        _timeout: Duration,
    ) -> Result<Value, BackendError> {
        Ok(self.answer(path, body.clone()))
    }
}

/// Backend whose every call fails as unreachable.
pub struct DownBackend;

#[async_trait]
impl SearchBackend for DownBackend {
    async fn get(&self, path: &str, _timeout: Duration) -> Result<Value, BackendError> {
        Err(BackendError::Unavailable {
            path: path.to_string(),
            message: "connection refused".to_string(),
        })
    }

    async fn post(
        &self,
        path: &str,
        _body: &Value,
        _timeout: Duration,
    ) -> Result<Value, BackendError> {
        Err(BackendError::Unavailable {
            path: path.to_string(),
            message: "connection refused".to_string(),
        })
    }
}

/// Search response with the given sources; total equals the hit count.
pub fn hits(sources: &[Value]) -> Value {
    hits_with_total(sources, sources.len() as u64)
}

pub fn hits_with_total(sources: &[Value], total: u64) -> Value {
    let hits: Vec<Value> = sources.iter().map(|s| json!({ "_source": s })).collect();
    json!({ "hits": { "total": { "value": total }, "hits": hits } })
}
