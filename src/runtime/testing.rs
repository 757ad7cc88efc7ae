//! Test doubles and helpers for runtime tests

use crate::compose::{ComposeError, ComposeService};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Scripted composition service. Results are consumed in queue order; a
/// gated instance records the call, then parks until the test releases
/// the gate.
pub struct MockComposeService {
    results: Mutex<VecDeque<Result<String, ComposeError>>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
}

impl MockComposeService {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Mock that blocks each call until `gate.notify_one()`
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn queue_result(&self, result_ref: &str) {
        self.results
            .lock()
            .unwrap()
            .push_back(Ok(result_ref.to_string()));
    }

    pub fn queue_error(&self, message: &str) {
        self.results
            .lock()
            .unwrap()
            .push_back(Err(ComposeError::Rejected(message.to_string())));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ComposeService for MockComposeService {
    async fn compose(&self, user_id: &str) -> Result<String, ComposeError> {
        self.calls.lock().unwrap().push(user_id.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("mock-result".to_string()))
    }
}

/// Poll `check` until it returns true or the deadline passes
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
