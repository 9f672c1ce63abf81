//! Workflow template endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use automation_shared::{
    Condition, TemplateCategory, TemplateInstantiation, WorkflowDefinition, WorkflowScope, WorkflowStatus,
    WorkflowTemplate,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::workflows::{parse_steps, parse_trigger, ActionStepInput};
use crate::auth::TenantContext;
use crate::workflows::{InstantiationOptions, NewTemplate};
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct TemplateQuery {
    pub category: Option<TemplateCategory>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, max = 255, message = "name must be between 1 and 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_category")]
    pub category: TemplateCategory,
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_config: Value,
    #[validate(length(min = 1, message = "at least one action is required"))]
    pub actions: Vec<ActionStepInput>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_category() -> TemplateCategory {
    TemplateCategory::General
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct InstantiateTemplateRequest {
    #[validate(length(min = 1, max = 255, message = "name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub scope: Option<WorkflowScope>,
    pub scope_id: Option<Uuid>,
    pub status: Option<WorkflowStatus>,
}

#[derive(Debug, Serialize)]
pub struct InstantiatedWorkflow {
    pub workflow: WorkflowDefinition,
    pub instantiation: TemplateInstantiation,
}

pub fn template_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_templates).post(create_template))
        .route("/:id", get(get_template))
        .route("/:id/instantiate", post(instantiate_template))
}

async fn list_templates(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Query(query): Query<TemplateQuery>,
) -> ApiResult<Json<Vec<WorkflowTemplate>>> {
    let templates = state
        .workflows
        .list_templates(tenant.company_id, query.category)
        .await?;
    Ok(Json(templates))
}

async fn get_template(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowTemplate>> {
    Ok(Json(state.workflows.get_template(tenant.company_id, id).await?))
}

async fn create_template(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Json(payload): Json<CreateTemplateRequest>,
) -> ApiResult<(StatusCode, Json<WorkflowTemplate>)> {
    payload.validate()?;

    let input = NewTemplate {
        name: payload.name,
        description: payload.description,
        category: payload.category,
        trigger_type: parse_trigger(&payload.trigger_type)?,
        trigger_config: payload.trigger_config,
        actions: parse_steps(payload.actions)?,
        conditions: payload.conditions,
        tags: payload.tags,
    };

    let template = state
        .workflows
        .create_template(tenant.company_id, tenant.user_id, input)
        .await?;

    Ok((StatusCode::CREATED, Json(template)))
}

async fn instantiate_template(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    payload: Option<Json<InstantiateTemplateRequest>>,
) -> ApiResult<(StatusCode, Json<InstantiatedWorkflow>)> {
    let Json(request) = payload.unwrap_or_default();
    request.validate()?;

    let options = InstantiationOptions {
        name: request.name,
        description: request.description,
        scope: request.scope,
        scope_id: request.scope_id,
        status: request.status,
    };

    let (workflow, instantiation) = state
        .workflows
        .instantiate_template(id, tenant.company_id, tenant.user_id, options)
        .await?;

    Ok((StatusCode::CREATED, Json(InstantiatedWorkflow { workflow, instantiation })))
}
