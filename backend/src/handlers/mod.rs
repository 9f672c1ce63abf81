use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{database, AppState};

pub mod events;
pub mod templates;
pub mod workflows;

pub use events::event_routes;
pub use templates::template_routes;
pub use workflows::workflow_routes;

/// Full HTTP surface of the automation service
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { concat!("CRM Workflow Automation API v", env!("CARGO_PKG_VERSION")) }))
        .route("/health", get(health_check))
        .nest("/api/v1/workflows", workflow_routes())
        .nest("/api/v1/workflow-templates", template_routes())
        .nest("/api/v1/workflow-events", event_routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    if database::health_check(&state.db_pool).await {
        (StatusCode::OK, Json(json!({"status": "healthy", "service": "crm-automation", "database": "up"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "service": "crm-automation", "database": "down"})),
        )
    }
}
