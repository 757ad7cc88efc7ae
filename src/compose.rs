//! External composition service client
//!
//! Composition is the only slow call in the system; everything else is a
//! store round-trip. The trait seam exists so tests can gate and script
//! the call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("compose transport error: {0}")]
    Transport(String),
    #[error("compose rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait ComposeService: Send + Sync {
    /// Combine the user's two stored inputs into one result, returning an
    /// artifact reference for it. Slow; only ever called from a detached
    /// task.
    async fn compose(&self, user_id: &str) -> Result<String, ComposeError>;
}

#[async_trait]
impl<T: ComposeService + ?Sized> ComposeService for Arc<T> {
    async fn compose(&self, user_id: &str) -> Result<String, ComposeError> {
        (**self).compose(user_id).await
    }
}

#[derive(Serialize)]
struct ComposeRequest<'a> {
    user_id: &'a str,
}

#[derive(Deserialize)]
struct ComposeResponse {
    result_ref: String,
}

/// HTTP client for the composition service
#[derive(Clone)]
pub struct HttpComposeService {
    client: reqwest::Client,
    url: String,
}

impl HttpComposeService {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ComposeService for HttpComposeService {
    async fn compose(&self, user_id: &str) -> Result<String, ComposeError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ComposeRequest { user_id })
            .send()
            .await
            .map_err(|err| ComposeError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComposeError::Rejected(format!("{status}: {body}")));
        }

        let parsed: ComposeResponse = response
            .json()
            .await
            .map_err(|err| ComposeError::Transport(err.to_string()))?;
        Ok(parsed.result_ref)
    }
}
