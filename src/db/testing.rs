//! Scripted backend for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::backend::{BackendRequest, BackendResponse, BackendService};
use super::error::{ConnectionError, Result};

/// Replays canned responses keyed by operation name and records every call.
///
/// Responses queue per key; the last one queued keeps answering once the
/// queue is down to it. `list_collections` may also be keyed as
/// `list_collections:<database>`.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<HashMap<String, VecDeque<Result<BackendResponse>>>>,
    calls: Mutex<Vec<BackendRequest>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond(&self, key: &str, response: Result<BackendResponse>) {
        self.responses
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn names(&self, key: &str, names: &[&str]) {
        self.respond(
            key,
            Ok(BackendResponse::Names(names.iter().map(|n| n.to_string()).collect())),
        );
    }

    pub fn calls(&self) -> Vec<BackendRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.calls().iter().map(BackendRequest::operation).collect()
    }

    fn next_response(&self, request: &BackendRequest) -> Result<BackendResponse> {
        let mut keys = Vec::new();
        if let BackendRequest::ListCollections { database, .. } = request {
            keys.push(format!("{}:{}", request.operation(), database));
        }
        keys.push(request.operation().to_string());

        let mut responses = self.responses.lock().unwrap();
        for key in keys {
            if let Some(queue) = responses.get_mut(&key) {
                let response = if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                };
                if let Some(response) = response {
                    return response;
                }
            }
        }
        Err(ConnectionError::BackendFailure(format!(
            "no scripted response for {}",
            request.operation()
        )))
    }
}

#[async_trait]
impl BackendService for ScriptedBackend {
    async fn call(&self, request: BackendRequest) -> Result<BackendResponse> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_response(&request)
    }
}
