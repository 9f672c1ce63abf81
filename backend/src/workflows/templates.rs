// Template Instantiator - turns a reusable template into an owned workflow definition

use automation_shared::{
    TemplateInstantiation, WorkflowDefinition, WorkflowScope, WorkflowStatus, WorkflowTemplate,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::errors::{RepositoryError, ValidationError, WorkflowError, WorkflowResult};
use super::executor::ActionRegistry;
use super::repository::WorkflowRepository;
use super::service::MAX_NAME_LEN;

const MAX_NAME_SUFFIX: u32 = 100;

/// Caller-supplied adjustments applied on top of the template
#[derive(Debug, Clone, Default)]
pub struct InstantiationOptions {
    pub name: Option<String>,
    pub description: Option<String>,
    pub scope: Option<WorkflowScope>,
    pub scope_id: Option<Uuid>,
    pub status: Option<WorkflowStatus>,
}

pub struct TemplateInstantiator {
    repository: Arc<dyn WorkflowRepository>,
    registry: Arc<ActionRegistry>,
}

impl TemplateInstantiator {
    pub fn new(repository: Arc<dyn WorkflowRepository>, registry: Arc<ActionRegistry>) -> Self {
        Self { repository, registry }
    }

    /// Create a definition owned by `user_id` from a template visible to `company_id`.
    ///
    /// Trigger, actions and conditions are copied; the template's usage count
    /// goes up by exactly one and an instantiation row is written.
    pub async fn instantiate(
        &self,
        template_id: Uuid,
        company_id: Uuid,
        user_id: Uuid,
        options: InstantiationOptions,
    ) -> WorkflowResult<(WorkflowDefinition, TemplateInstantiation)> {
        let template = self.repository.get_template(template_id).await?;
        if !template.visible_to(company_id) {
            return Err(WorkflowError::NotFound("Workflow template".to_string()));
        }

        self.registry.validate_steps(&template.actions)?;

        let base_name = match options.name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            Some(_) => return Err(ValidationError::field("name", "name must not be blank").into()),
            None => template.name.clone(),
        };
        let scope = options.scope.unwrap_or(WorkflowScope::Company);
        let scope_id = scope_owner(scope, options.scope_id, user_id)?;
        let name = self.available_name(company_id, &base_name).await?;

        let workflow = build_definition(
            &template,
            company_id,
            user_id,
            name,
            options.description,
            (scope, scope_id),
            options.status,
        );

        let instantiation = TemplateInstantiation {
            id: Uuid::new_v4(),
            template_id: template.id,
            workflow_id: workflow.id,
            company_id,
            instantiated_by: user_id,
            created_at: workflow.created_at,
        };

        self.repository
            .create_from_template(&workflow, &instantiation)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => WorkflowError::Conflict(format!(
                    "a workflow named '{}' already exists",
                    workflow.name
                )),
                other => other.into(),
            })?;

        info!(
            template_id = %template.id,
            workflow_id = %workflow.id,
            %company_id,
            "Workflow instantiated from template"
        );

        Ok((workflow, instantiation))
    }

    // "Lead nurture", then "Lead nurture (2)", "Lead nurture (3)", ...
    // Long bases are cut so the suffixed name still fits the name column.
    async fn available_name(&self, company_id: Uuid, base: &str) -> WorkflowResult<String> {
        if !self.repository.name_exists(company_id, base, None).await? {
            return Ok(base.to_string());
        }
        for n in 2..=MAX_NAME_SUFFIX {
            let suffix = format!(" ({})", n);
            let room = MAX_NAME_LEN.saturating_sub(suffix.chars().count());
            let stem: String = base.chars().take(room).collect();
            let candidate = format!("{}{}", stem.trim_end(), suffix);
            if !self.repository.name_exists(company_id, &candidate, None).await? {
                return Ok(candidate);
            }
        }
        Err(WorkflowError::Conflict(format!("no free name left for '{}'", base)))
    }
}

/// The id a scoped definition is bound to; user scope defaults to the owner
pub fn scope_owner(
    scope: WorkflowScope,
    scope_id: Option<Uuid>,
    owner_id: Uuid,
) -> Result<Option<Uuid>, ValidationError> {
    match scope {
        WorkflowScope::Company => Ok(None),
        WorkflowScope::Team => scope_id
            .map(Some)
            .ok_or_else(|| ValidationError::field("scope_id", "team-scoped workflows need a team id")),
        WorkflowScope::User => Ok(Some(scope_id.unwrap_or(owner_id))),
    }
}

fn build_definition(
    template: &WorkflowTemplate,
    company_id: Uuid,
    owner_id: Uuid,
    name: String,
    description: Option<String>,
    (scope, scope_id): (WorkflowScope, Option<Uuid>),
    status: Option<WorkflowStatus>,
) -> WorkflowDefinition {
    WorkflowDefinition {
        id: Uuid::new_v4(),
        company_id,
        name,
        description: description.or_else(|| template.description.clone()),
        trigger_type: template.trigger_type,
        trigger_config: template.trigger_config.clone(),
        conditions: template.conditions.clone(),
        actions: template.actions.clone(),
        status: status.unwrap_or(WorkflowStatus::Active),
        scope,
        scope_id,
        owner_id,
        template_id: Some(template.id),
        execution_count: 0,
        max_executions: None,
        last_executed_at: None,
        is_deleted: false,
        created_at: Utc::now(),
        updated_at: None,
    }
}
