//! Workflow definition and execution endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use automation_shared::{
    ActionStep, ActionType, Condition, ExecutionRecord, TriggerType, WorkflowDefinition, WorkflowScope,
    WorkflowStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::TenantContext;
use crate::workflows::{NewWorkflow, ValidationError, WorkflowFilter, WorkflowUpdate};
use crate::{ApiResult, AppState, PaginatedResponse, PaginationParams};

// ==================== Requests ====================

/// Action step as submitted; the kind stays a string until validated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStepInput {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub config: Value,
    pub name: Option<String>,
}

impl ActionStepInput {
    pub fn into_step(self) -> Result<ActionStep, ValidationError> {
        Ok(ActionStep {
            action_type: ActionType::from_str(&self.action_type)?,
            config: self.config,
            name: self.name,
        })
    }
}

pub fn parse_steps(inputs: Vec<ActionStepInput>) -> Result<Vec<ActionStep>, ValidationError> {
    inputs.into_iter().map(ActionStepInput::into_step).collect()
}

pub fn parse_trigger(raw: &str) -> Result<TriggerType, ValidationError> {
    Ok(TriggerType::from_str(raw)?)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkflowRequest {
    #[validate(length(min = 1, max = 255, message = "name must be between 1 and 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_config: Value,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[validate(length(min = 1, message = "at least one action is required"))]
    pub actions: Vec<ActionStepInput>,
    pub status: Option<WorkflowStatus>,
    pub scope: Option<WorkflowScope>,
    pub scope_id: Option<Uuid>,
    #[validate(range(min = 1, message = "max_executions must be at least 1"))]
    pub max_executions: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateWorkflowRequest {
    #[validate(length(min = 1, max = 255, message = "name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger_type: Option<String>,
    pub trigger_config: Option<Value>,
    pub conditions: Option<Vec<Condition>>,
    pub actions: Option<Vec<ActionStepInput>>,
    pub scope: Option<WorkflowScope>,
    pub scope_id: Option<Uuid>,
    #[validate(range(min = 1, message = "max_executions must be at least 1"))]
    pub max_executions: Option<i64>,
}

/// Query parameters are kept flat; serde's flatten does not parse numbers from query strings
#[derive(Debug, Deserialize)]
pub struct ListWorkflowsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<WorkflowStatus>,
    pub trigger_type: Option<String>,
}

impl ListWorkflowsQuery {
    fn pagination(&self) -> PaginationParams {
        let defaults = PaginationParams::default();
        PaginationParams {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExecutionsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteWorkflowRequest {
    #[serde(default)]
    pub trigger_data: Value,
}

// ==================== Routes ====================

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/:id", get(get_workflow).put(update_workflow).delete(delete_workflow))
        .route("/:id/toggle", post(toggle_workflow))
        .route("/:id/reactivate", post(reactivate_workflow))
        .route("/:id/deactivate", post(deactivate_workflow))
        .route("/:id/execute", post(execute_workflow))
        .route("/:id/executions", get(list_executions))
}

// ==================== Handlers ====================

async fn list_workflows(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Query(query): Query<ListWorkflowsQuery>,
) -> ApiResult<Json<PaginatedResponse<WorkflowDefinition>>> {
    let pagination = query.pagination();
    let filter = WorkflowFilter {
        status: query.status,
        trigger_type: query.trigger_type.as_deref().map(parse_trigger).transpose()?,
    };

    let (workflows, total) = state
        .workflows
        .list_workflows(tenant.company_id, filter, pagination.to_page())
        .await?;

    Ok(Json(PaginatedResponse::new(workflows, &pagination, total)))
}

async fn create_workflow(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Json(payload): Json<CreateWorkflowRequest>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    payload.validate()?;

    let input = NewWorkflow {
        name: payload.name,
        description: payload.description,
        trigger_type: parse_trigger(&payload.trigger_type)?,
        trigger_config: payload.trigger_config,
        conditions: payload.conditions,
        actions: parse_steps(payload.actions)?,
        status: payload.status,
        scope: payload.scope,
        scope_id: payload.scope_id,
        max_executions: payload.max_executions,
    };

    let workflow = state
        .workflows
        .create_workflow(tenant.company_id, tenant.user_id, input)
        .await?;

    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn get_workflow(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let workflow = state.workflows.get_workflow(tenant.company_id, id).await?;
    Ok(Json(workflow))
}

async fn update_workflow(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateWorkflowRequest>,
) -> ApiResult<Json<WorkflowDefinition>> {
    payload.validate()?;

    let update = WorkflowUpdate {
        name: payload.name,
        description: payload.description,
        trigger_type: payload.trigger_type.as_deref().map(parse_trigger).transpose()?,
        trigger_config: payload.trigger_config,
        conditions: payload.conditions,
        actions: payload.actions.map(parse_steps).transpose()?,
        scope: payload.scope,
        scope_id: payload.scope_id,
        max_executions: payload.max_executions,
    };

    let workflow = state
        .workflows
        .update_workflow(tenant.company_id, id, update)
        .await?;

    Ok(Json(workflow))
}

async fn delete_workflow(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.workflows.delete_workflow(tenant.company_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_workflow(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowDefinition>> {
    Ok(Json(state.workflows.toggle_workflow(tenant.company_id, id).await?))
}

async fn reactivate_workflow(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowDefinition>> {
    Ok(Json(state.workflows.reactivate_workflow(tenant.company_id, id).await?))
}

async fn deactivate_workflow(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowDefinition>> {
    Ok(Json(state.workflows.deactivate_workflow(tenant.company_id, id).await?))
}

async fn execute_workflow(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    payload: Option<Json<ExecuteWorkflowRequest>>,
) -> ApiResult<Json<ExecutionRecord>> {
    let Json(request) = payload.unwrap_or_default();
    let record = state
        .workflows
        .execute_workflow(tenant.company_id, id, tenant.user_id, request.trigger_data)
        .await?;
    Ok(Json(record))
}

async fn list_executions(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Query(query): Query<ExecutionsQuery>,
) -> ApiResult<Json<PaginatedResponse<ExecutionRecord>>> {
    let defaults = PaginationParams::default();
    let pagination = PaginationParams {
        page: query.page.unwrap_or(defaults.page),
        per_page: query.per_page.unwrap_or(defaults.per_page),
    };

    let (records, total) = state
        .workflows
        .list_executions(tenant.company_id, id, pagination.to_page())
        .await?;

    Ok(Json(PaginatedResponse::new(records, &pagination, total)))
}
