// Workflow Repository - persistence port for definitions, executions and templates

use async_trait::async_trait;
use automation_shared::{
    ExecutionRecord, TemplateCategory, TemplateInstantiation, TriggerType, WorkflowDefinition, WorkflowStatus,
    WorkflowTemplate,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::RepositoryError;
use super::triggers::OwnerScope;

pub type RepoResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowFilter {
    pub status: Option<WorkflowStatus>,
    pub trigger_type: Option<TriggerType>,
}

impl WorkflowFilter {
    pub fn accepts(&self, workflow: &WorkflowDefinition) -> bool {
        self.status.is_none_or(|s| s == workflow.status)
            && self.trigger_type.is_none_or(|t| t == workflow.trigger_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: 25, offset: 0 }
    }
}

/// Result of [`WorkflowRepository::claim_execution`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotClaim {
    Claimed,
    CapReached { count: i64, max: i64 },
}

/// Storage for the four workflow record kinds.
///
/// Every read ignores soft-deleted definitions.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create_workflow(&self, workflow: &WorkflowDefinition) -> RepoResult<()>;

    /// Tenant-scoped lookup; `NotFound` for other tenants' definitions
    async fn get_workflow(&self, company_id: Uuid, id: Uuid) -> RepoResult<WorkflowDefinition>;

    /// Returns one page of definitions and the total matching count
    async fn list_workflows(
        &self,
        company_id: Uuid,
        filter: WorkflowFilter,
        page: Page,
    ) -> RepoResult<(Vec<WorkflowDefinition>, i64)>;

    async fn update_workflow(&self, workflow: &WorkflowDefinition) -> RepoResult<()>;

    async fn set_status(&self, company_id: Uuid, id: Uuid, status: WorkflowStatus) -> RepoResult<()>;

    async fn soft_delete(&self, company_id: Uuid, id: Uuid) -> RepoResult<()>;

    async fn name_exists(&self, company_id: Uuid, name: &str, excluding: Option<Uuid>) -> RepoResult<bool>;

    /// ACTIVE definitions for a trigger type, narrowed to the owner scope when given
    async fn find_active_by_trigger(
        &self,
        trigger_type: TriggerType,
        scope: Option<OwnerScope>,
    ) -> RepoResult<Vec<WorkflowDefinition>>;

    /// Reserve one execution against the definition's cap.
    ///
    /// The check and the `execution_count` increment happen in one atomic
    /// step, so overlapping runs can never push the count past `max_executions`.
    async fn claim_execution(&self, workflow_id: Uuid) -> RepoResult<SlotClaim>;

    /// Hand back a slot taken by a run that aborted
    async fn release_execution(&self, workflow_id: Uuid) -> RepoResult<()>;

    /// Stamp `last_executed_at` once a run reaches success or partial
    async fn mark_executed(&self, workflow_id: Uuid, at: DateTime<Utc>) -> RepoResult<()>;

    async fn create_execution(&self, record: &ExecutionRecord) -> RepoResult<()>;

    async fn finalize_execution(&self, record: &ExecutionRecord) -> RepoResult<()>;

    /// Most recent first
    async fn list_executions(&self, workflow_id: Uuid, page: Page) -> RepoResult<(Vec<ExecutionRecord>, i64)>;

    async fn get_template(&self, id: Uuid) -> RepoResult<WorkflowTemplate>;

    /// Global templates plus the tenant's own
    async fn list_templates(
        &self,
        company_id: Uuid,
        category: Option<TemplateCategory>,
    ) -> RepoResult<Vec<WorkflowTemplate>>;

    async fn create_template(&self, template: &WorkflowTemplate) -> RepoResult<()>;

    /// Insert the definition and instantiation row and bump the template's
    /// usage count, all or nothing
    async fn create_from_template(
        &self,
        workflow: &WorkflowDefinition,
        instantiation: &TemplateInstantiation,
    ) -> RepoResult<()>;
}
