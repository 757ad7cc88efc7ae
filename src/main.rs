//! Pairflow - conversational pairing workflow service
//!
//! Users supply two inputs; a slow external composition combines them; the
//! user polls for the result. The event router keeps every per-user flow
//! consistent under concurrent, redelivered events.

mod api;
mod compose;
mod flow;
mod runtime;
mod store;

use api::{create_router, AppState};
use compose::HttpComposeService;
use runtime::{ComposeCoordinator, EventRouter};
use std::net::SocketAddr;
use std::sync::Arc;
use store::{FlowConfig, FlowStore, LockManager, MemoryStore, StoreInputStore};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pairflow=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let port: u16 = std::env::var("PAIRFLOW_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8090);

    let compose_url = match std::env::var("PAIRFLOW_COMPOSE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!("PAIRFLOW_COMPOSE_URL not set; using local default");
            "http://localhost:8091/compose".to_string()
        }
    };

    let config = FlowConfig::from_env();
    tracing::info!(
        session_ttl_secs = config.session_ttl.as_secs(),
        result_ttl_secs = config.result_ttl.as_secs(),
        lock_ttl_secs = config.lock_ttl.as_secs(),
        "flow configuration loaded"
    );

    let kv = MemoryStore::new();
    let flow_store = FlowStore::new(kv.clone(), config);
    let locks = LockManager::new(kv.clone(), config.lock_ttl);
    let inputs = Arc::new(StoreInputStore::new(kv, config.session_ttl));
    let compose = Arc::new(HttpComposeService::new(compose_url));
    let coordinator = ComposeCoordinator::new(flow_store.clone(), locks.clone(), compose);
    let router = Arc::new(EventRouter::new(flow_store, locks, inputs, coordinator));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(AppState { router }).layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("pairflow listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
