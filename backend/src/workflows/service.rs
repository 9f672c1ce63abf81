// Workflow Service - administrative operations over definitions, executions and templates

use automation_shared::{
    ActionStep, Condition, ExecutionRecord, TemplateCategory, TemplateInstantiation, TriggerType, WorkflowDefinition,
    WorkflowScope, WorkflowStatus, WorkflowTemplate,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::dispatcher::{DispatchQueue, TriggerDispatcher};
use super::engine::ExecutionEngine;
use super::errors::{DispatchError, RepositoryError, ValidationError, WorkflowError, WorkflowResult};
use super::executor::ActionRegistry;
use super::repository::{Page, WorkflowFilter, WorkflowRepository};
use super::templates::{InstantiationOptions, TemplateInstantiator, scope_owner};
use super::triggers::{MAX_INTERVAL_MINUTES, OwnerScope, TriggerEvent};

pub(super) const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct NewWorkflow {
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    pub trigger_config: Value,
    pub conditions: Vec<Condition>,
    pub actions: Vec<ActionStep>,
    pub status: Option<WorkflowStatus>,
    pub scope: Option<WorkflowScope>,
    pub scope_id: Option<Uuid>,
    pub max_executions: Option<i64>,
}

/// Fields left as `None` keep their stored value
#[derive(Debug, Clone, Default)]
pub struct WorkflowUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger_type: Option<TriggerType>,
    pub trigger_config: Option<Value>,
    pub conditions: Option<Vec<Condition>>,
    pub actions: Option<Vec<ActionStep>>,
    pub scope: Option<WorkflowScope>,
    pub scope_id: Option<Uuid>,
    pub max_executions: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    pub category: TemplateCategory,
    pub trigger_type: TriggerType,
    pub trigger_config: Value,
    pub actions: Vec<ActionStep>,
    pub conditions: Vec<Condition>,
    pub tags: Vec<String>,
}

pub struct WorkflowService {
    repository: Arc<dyn WorkflowRepository>,
    registry: Arc<ActionRegistry>,
    engine: Arc<ExecutionEngine>,
    dispatcher: Arc<TriggerDispatcher>,
    instantiator: TemplateInstantiator,
    queue: Option<Arc<DispatchQueue>>,
}

impl WorkflowService {
    pub fn new(repository: Arc<dyn WorkflowRepository>, registry: Arc<ActionRegistry>) -> Self {
        let engine = Arc::new(ExecutionEngine::new(repository.clone(), registry.clone()));
        let dispatcher = Arc::new(TriggerDispatcher::new(repository.clone(), engine.clone()));
        let instantiator = TemplateInstantiator::new(repository.clone(), registry.clone());

        Self {
            repository,
            registry,
            engine,
            dispatcher,
            instantiator,
            queue: None,
        }
    }

    /// Route ingested events through a bounded worker pool
    pub fn with_queue(mut self, queue: Arc<DispatchQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn dispatcher(&self) -> Arc<TriggerDispatcher> {
        self.dispatcher.clone()
    }

    // ---- definitions ----

    pub async fn create_workflow(
        &self,
        company_id: Uuid,
        owner_id: Uuid,
        input: NewWorkflow,
    ) -> WorkflowResult<WorkflowDefinition> {
        let name = validate_name(&input.name)?;
        let trigger_config = normalize_trigger_config(input.trigger_type, input.trigger_config)?;
        validate_conditions(&input.conditions)?;
        validate_max_executions(input.max_executions)?;
        self.registry.validate_steps(&input.actions)?;

        let scope = input.scope.unwrap_or(WorkflowScope::Company);
        let scope_id = scope_owner(scope, input.scope_id, owner_id)?;

        if self.repository.name_exists(company_id, &name, None).await? {
            return Err(duplicate_name(&name));
        }

        let workflow = WorkflowDefinition {
            id: Uuid::new_v4(),
            company_id,
            name,
            description: input.description,
            trigger_type: input.trigger_type,
            trigger_config,
            conditions: input.conditions,
            actions: input.actions,
            status: input.status.unwrap_or(WorkflowStatus::Active),
            scope,
            scope_id,
            owner_id,
            template_id: None,
            execution_count: 0,
            max_executions: input.max_executions,
            last_executed_at: None,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: None,
        };

        self.repository
            .create_workflow(&workflow)
            .await
            .map_err(|e| conflict_as_duplicate(e, &workflow.name))?;

        info!(workflow_id = %workflow.id, %company_id, trigger = %workflow.trigger_type, "Workflow created");
        Ok(workflow)
    }

    pub async fn list_workflows(
        &self,
        company_id: Uuid,
        filter: WorkflowFilter,
        page: Page,
    ) -> WorkflowResult<(Vec<WorkflowDefinition>, i64)> {
        Ok(self.repository.list_workflows(company_id, filter, page).await?)
    }

    pub async fn get_workflow(&self, company_id: Uuid, id: Uuid) -> WorkflowResult<WorkflowDefinition> {
        Ok(self.repository.get_workflow(company_id, id).await?)
    }

    pub async fn update_workflow(
        &self,
        company_id: Uuid,
        id: Uuid,
        update: WorkflowUpdate,
    ) -> WorkflowResult<WorkflowDefinition> {
        let mut workflow = self.repository.get_workflow(company_id, id).await?;

        if let Some(name) = update.name {
            let name = validate_name(&name)?;
            if name != workflow.name && self.repository.name_exists(company_id, &name, Some(id)).await? {
                return Err(duplicate_name(&name));
            }
            workflow.name = name;
        }
        if let Some(description) = update.description {
            workflow.description = Some(description);
        }
        if let Some(trigger_type) = update.trigger_type {
            workflow.trigger_type = trigger_type;
        }
        let trigger_config = update.trigger_config.unwrap_or_else(|| workflow.trigger_config.clone());
        workflow.trigger_config = normalize_trigger_config(workflow.trigger_type, trigger_config)?;
        if let Some(conditions) = update.conditions {
            validate_conditions(&conditions)?;
            workflow.conditions = conditions;
        }
        if let Some(actions) = update.actions {
            self.registry.validate_steps(&actions)?;
            workflow.actions = actions;
        }
        if update.scope.is_some() || update.scope_id.is_some() {
            let scope = update.scope.unwrap_or(workflow.scope);
            workflow.scope_id = scope_owner(scope, update.scope_id.or(workflow.scope_id), workflow.owner_id)?;
            workflow.scope = scope;
        }
        if update.max_executions.is_some() {
            validate_max_executions(update.max_executions)?;
            workflow.max_executions = update.max_executions;
        }

        self.repository
            .update_workflow(&workflow)
            .await
            .map_err(|e| conflict_as_duplicate(e, &workflow.name))?;
        workflow.updated_at = Some(Utc::now());

        info!(workflow_id = %id, "Workflow updated");
        Ok(workflow)
    }

    pub async fn delete_workflow(&self, company_id: Uuid, id: Uuid) -> WorkflowResult<()> {
        self.repository.soft_delete(company_id, id).await?;
        info!(workflow_id = %id, "Workflow deleted");
        Ok(())
    }

    /// ACTIVE ↔ PAUSED; INACTIVE definitions must be reactivated first
    pub async fn toggle_workflow(&self, company_id: Uuid, id: Uuid) -> WorkflowResult<WorkflowDefinition> {
        let workflow = self.repository.get_workflow(company_id, id).await?;
        let next = workflow.status.toggled().ok_or_else(|| {
            WorkflowError::Conflict("inactive workflows must be reactivated before they can be toggled".to_string())
        })?;
        self.transition(workflow, next).await
    }

    /// INACTIVE → PAUSED
    pub async fn reactivate_workflow(&self, company_id: Uuid, id: Uuid) -> WorkflowResult<WorkflowDefinition> {
        let workflow = self.repository.get_workflow(company_id, id).await?;
        if workflow.status != WorkflowStatus::Inactive {
            return Err(WorkflowError::Conflict(format!(
                "only inactive workflows can be reactivated (status is {})",
                workflow.status
            )));
        }
        self.transition(workflow, WorkflowStatus::Paused).await
    }

    pub async fn deactivate_workflow(&self, company_id: Uuid, id: Uuid) -> WorkflowResult<WorkflowDefinition> {
        let workflow = self.repository.get_workflow(company_id, id).await?;
        if workflow.status == WorkflowStatus::Inactive {
            return Ok(workflow);
        }
        self.transition(workflow, WorkflowStatus::Inactive).await
    }

    async fn transition(
        &self,
        mut workflow: WorkflowDefinition,
        status: WorkflowStatus,
    ) -> WorkflowResult<WorkflowDefinition> {
        self.repository
            .set_status(workflow.company_id, workflow.id, status)
            .await?;
        info!(workflow_id = %workflow.id, from = %workflow.status, to = %status, "Workflow status changed");
        workflow.status = status;
        workflow.updated_at = Some(Utc::now());
        Ok(workflow)
    }

    // ---- execution ----

    /// Run one ACTIVE definition now, bypassing trigger matching
    pub async fn execute_workflow(
        &self,
        company_id: Uuid,
        id: Uuid,
        triggered_by: Uuid,
        trigger_data: Value,
    ) -> WorkflowResult<ExecutionRecord> {
        let workflow = self.repository.get_workflow(company_id, id).await?;
        if !workflow.is_eligible() {
            return Err(WorkflowError::Conflict(format!(
                "only active workflows can be executed (status is {})",
                workflow.status
            )));
        }
        let event = TriggerEvent::manual(workflow.id, triggered_by, trigger_data);
        Ok(self.engine.run(&workflow, event.trigger_type, event.trigger_data).await?)
    }

    pub async fn list_executions(
        &self,
        company_id: Uuid,
        workflow_id: Uuid,
        page: Page,
    ) -> WorkflowResult<(Vec<ExecutionRecord>, i64)> {
        self.repository.get_workflow(company_id, workflow_id).await?;
        Ok(self.repository.list_executions(workflow_id, page).await?)
    }

    /// Accept a domain event for background dispatch within the caller's tenant
    pub fn ingest_event(&self, company_id: Uuid, mut event: TriggerEvent) -> WorkflowResult<Uuid> {
        let queue = self.queue.as_ref().ok_or(DispatchError::Closed)?;

        let scope = event.owner_scope.unwrap_or_else(|| OwnerScope::company(company_id));
        event.owner_scope = Some(OwnerScope { company_id, ..scope });

        let event_id = event.event_id;
        queue.enqueue(event)?;
        Ok(event_id)
    }

    // ---- templates ----

    pub async fn list_templates(
        &self,
        company_id: Uuid,
        category: Option<TemplateCategory>,
    ) -> WorkflowResult<Vec<WorkflowTemplate>> {
        Ok(self.repository.list_templates(company_id, category).await?)
    }

    pub async fn get_template(&self, company_id: Uuid, id: Uuid) -> WorkflowResult<WorkflowTemplate> {
        let template = self.repository.get_template(id).await?;
        if !template.visible_to(company_id) {
            return Err(WorkflowError::NotFound("Workflow template".to_string()));
        }
        Ok(template)
    }

    /// Tenant-owned template; global templates are seeded outside the API
    pub async fn create_template(
        &self,
        company_id: Uuid,
        created_by: Uuid,
        input: NewTemplate,
    ) -> WorkflowResult<WorkflowTemplate> {
        let name = validate_name(&input.name)?;
        let trigger_config = normalize_trigger_config(input.trigger_type, input.trigger_config)?;
        validate_conditions(&input.conditions)?;
        self.registry.validate_steps(&input.actions)?;

        let template = WorkflowTemplate {
            id: Uuid::new_v4(),
            name,
            description: input.description,
            category: input.category,
            trigger_type: input.trigger_type,
            trigger_config,
            actions: input.actions,
            conditions: input.conditions,
            tags: input.tags,
            usage_count: 0,
            is_global: false,
            created_by: Some(created_by),
            company_id: Some(company_id),
            created_at: Utc::now(),
        };

        self.repository.create_template(&template).await?;
        info!(template_id = %template.id, %company_id, "Workflow template created");
        Ok(template)
    }

    pub async fn instantiate_template(
        &self,
        template_id: Uuid,
        company_id: Uuid,
        user_id: Uuid,
        options: InstantiationOptions,
    ) -> WorkflowResult<(WorkflowDefinition, TemplateInstantiation)> {
        self.instantiator
            .instantiate(template_id, company_id, user_id, options)
            .await
    }
}

fn validate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::field("name", "name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::field(
            "name",
            format!("name must be at most {} characters", MAX_NAME_LEN),
        ));
    }
    Ok(name.to_string())
}

fn validate_max_executions(max: Option<i64>) -> Result<(), ValidationError> {
    match max {
        Some(m) if m < 1 => Err(ValidationError::field("max_executions", "must be at least 1")),
        _ => Ok(()),
    }
}

fn validate_conditions(conditions: &[Condition]) -> Result<(), ValidationError> {
    match conditions.iter().position(|c| c.field.trim().is_empty()) {
        Some(i) => Err(ValidationError::field(
            &format!("conditions[{}].field", i),
            "condition field is required",
        )),
        None => Ok(()),
    }
}

/// `null` becomes `{}`; scheduled triggers need an interval of at most a year when one is given
fn normalize_trigger_config(trigger_type: TriggerType, config: Value) -> Result<Value, ValidationError> {
    let config = match config {
        Value::Null => Value::Object(Default::default()),
        Value::Object(map) => Value::Object(map),
        _ => return Err(ValidationError::field("trigger_config", "must be an object")),
    };

    if trigger_type == TriggerType::Scheduled {
        if let Some(interval) = config.get("interval_minutes") {
            if interval
                .as_i64()
                .filter(|m| (1..=MAX_INTERVAL_MINUTES).contains(m))
                .is_none()
            {
                return Err(ValidationError::field(
                    "trigger_config.interval_minutes",
                    format!("must be an integer between 1 and {}", MAX_INTERVAL_MINUTES),
                ));
            }
        }
    }

    Ok(config)
}

fn duplicate_name(name: &str) -> WorkflowError {
    WorkflowError::Conflict(format!("a workflow named '{}' already exists", name))
}

fn conflict_as_duplicate(err: RepositoryError, name: &str) -> WorkflowError {
    match err {
        RepositoryError::Conflict(_) => duplicate_name(name),
        other => other.into(),
    }
}
