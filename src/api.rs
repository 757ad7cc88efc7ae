//! HTTP API: the transport edge that feeds normalized events to the router

use crate::compose::HttpComposeService;
use crate::flow::InboundEvent;
use crate::runtime::{EventRouter, RouterError};
use crate::store::{MemoryStore, StoreInputStore};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

pub type ProductionRouter =
    EventRouter<MemoryStore, HttpComposeService, StoreInputStore<MemoryStore>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProductionRouter>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/events", post(handle_event))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Handle one inbound event and return its reply intent.
///
/// 400 means the event is malformed and retrying is pointless; 500 means a
/// store failure and the transport should redeliver.
async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> Response {
    match state.router.handle(&event).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(RouterError::InvalidEvent(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: reason }),
        )
            .into_response(),
        Err(RouterError::Store(err)) => {
            error!(%err, "store failure while handling event; expecting redelivery");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "store unavailable".to_string(),
                }),
            )
                .into_response()
        }
    }
}
