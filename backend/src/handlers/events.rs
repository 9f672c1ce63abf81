//! Domain event ingestion

use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use automation_shared::TriggerType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::workflows::parse_trigger;
use crate::auth::TenantContext;
use crate::workflows::{OwnerScope, TriggerEvent, ValidationError};
use crate::{ApiResult, AppState};

/// Narrowing within the caller's company; the company itself always comes from the tenant headers
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EventScope {
    pub team_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct IngestEventRequest {
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_data: Value,
    pub owner_scope: Option<EventScope>,
}

#[derive(Debug, Serialize)]
pub struct EventAccepted {
    pub event_id: Uuid,
    pub trigger_type: TriggerType,
    pub status: &'static str,
}

pub fn event_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(ingest_event))
}

async fn ingest_event(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Json(payload): Json<IngestEventRequest>,
) -> ApiResult<(StatusCode, Json<EventAccepted>)> {
    let trigger_type = parse_trigger(&payload.trigger_type)?;
    // scheduled and manual runs have their own entry points
    if matches!(trigger_type, TriggerType::Scheduled | TriggerType::Manual) {
        return Err(ValidationError::field(
            "trigger_type",
            format!("{} is not a domain event", trigger_type),
        )
        .into());
    }

    let scope = match payload.owner_scope {
        Some(narrowing) => OwnerScope {
            company_id: tenant.company_id,
            team_id: narrowing.team_id,
            user_id: narrowing.user_id,
        },
        None => tenant.owner_scope(),
    };

    let event = TriggerEvent::new(trigger_type, payload.trigger_data).with_scope(scope);
    let event_id = state.workflows.ingest_event(tenant.company_id, event)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            event_id,
            trigger_type,
            status: "accepted",
        }),
    ))
}
