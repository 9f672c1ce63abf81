// Postgres Workflow Repository - sqlx implementation of the persistence port

use async_trait::async_trait;
use automation_shared::{
    ExecutionRecord, ExecutionStatus, TemplateCategory, TemplateInstantiation, TriggerType, WorkflowDefinition,
    WorkflowScope, WorkflowStatus, WorkflowTemplate,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::errors::RepositoryError;
use super::repository::{Page, RepoResult, SlotClaim, WorkflowFilter, WorkflowRepository};
use super::triggers::OwnerScope;

const WORKFLOW_COLUMNS: &str = r#"
    id, company_id, name, description, trigger_type, trigger_config, conditions, actions,
    status, scope, scope_id, owner_id, template_id, execution_count, max_executions,
    last_executed_at, is_deleted, created_at, updated_at
"#;

const EXECUTION_COLUMNS: &str = r#"
    id, workflow_id, company_id, status, trigger_type, trigger_data, action_log,
    success_count, failure_count, started_at, completed_at, duration_ms, error_message
"#;

const TEMPLATE_COLUMNS: &str = r#"
    id, name, description, category, trigger_type, trigger_config, actions, conditions,
    tags, usage_count, is_global, created_by, company_id, created_at
"#;

#[derive(Clone)]
pub struct PgWorkflowRepository {
    pool: PgPool,
}

impl PgWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct WorkflowRow {
    id: Uuid,
    company_id: Uuid,
    name: String,
    description: Option<String>,
    trigger_type: String,
    trigger_config: Value,
    conditions: Value,
    actions: Value,
    status: WorkflowStatus,
    scope: WorkflowScope,
    scope_id: Option<Uuid>,
    owner_id: Uuid,
    template_id: Option<Uuid>,
    execution_count: i64,
    max_executions: Option<i64>,
    last_executed_at: Option<DateTime<Utc>>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct ExecutionRow {
    id: Uuid,
    workflow_id: Uuid,
    company_id: Uuid,
    status: ExecutionStatus,
    trigger_type: String,
    trigger_data: Value,
    action_log: Value,
    success_count: i32,
    failure_count: i32,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    error_message: Option<String>,
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    category: TemplateCategory,
    trigger_type: String,
    trigger_config: Value,
    actions: Value,
    conditions: Value,
    tags: Vec<String>,
    usage_count: i64,
    is_global: bool,
    created_by: Option<Uuid>,
    company_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

fn decode<T: DeserializeOwned>(entity: &'static str, value: Value) -> RepoResult<T> {
    serde_json::from_value(value).map_err(|e| RepositoryError::Corrupt {
        entity,
        reason: e.to_string(),
    })
}

fn encode<T: Serialize>(entity: &'static str, value: &T) -> RepoResult<Value> {
    serde_json::to_value(value).map_err(|e| RepositoryError::Corrupt {
        entity,
        reason: e.to_string(),
    })
}

fn parse_trigger(entity: &'static str, raw: &str) -> RepoResult<TriggerType> {
    raw.parse().map_err(|e: automation_shared::UnknownVariant| RepositoryError::Corrupt {
        entity,
        reason: e.to_string(),
    })
}

impl TryFrom<WorkflowRow> for WorkflowDefinition {
    type Error = RepositoryError;

    fn try_from(row: WorkflowRow) -> RepoResult<Self> {
        Ok(WorkflowDefinition {
            id: row.id,
            company_id: row.company_id,
            name: row.name,
            description: row.description,
            trigger_type: parse_trigger("workflow", &row.trigger_type)?,
            trigger_config: row.trigger_config,
            conditions: decode("workflow", row.conditions)?,
            actions: decode("workflow", row.actions)?,
            status: row.status,
            scope: row.scope,
            scope_id: row.scope_id,
            owner_id: row.owner_id,
            template_id: row.template_id,
            execution_count: row.execution_count,
            max_executions: row.max_executions,
            last_executed_at: row.last_executed_at,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = RepositoryError;

    fn try_from(row: ExecutionRow) -> RepoResult<Self> {
        Ok(ExecutionRecord {
            id: row.id,
            workflow_id: row.workflow_id,
            company_id: row.company_id,
            status: row.status,
            trigger_type: parse_trigger("execution", &row.trigger_type)?,
            trigger_data: row.trigger_data,
            action_log: decode("execution", row.action_log)?,
            success_count: row.success_count,
            failure_count: row.failure_count,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms,
            error_message: row.error_message,
        })
    }
}

impl TryFrom<TemplateRow> for WorkflowTemplate {
    type Error = RepositoryError;

    fn try_from(row: TemplateRow) -> RepoResult<Self> {
        Ok(WorkflowTemplate {
            id: row.id,
            name: row.name,
            description: row.description,
            category: row.category,
            trigger_type: parse_trigger("template", &row.trigger_type)?,
            trigger_config: row.trigger_config,
            actions: decode("template", row.actions)?,
            conditions: decode("template", row.conditions)?,
            tags: row.tags,
            usage_count: row.usage_count,
            is_global: row.is_global,
            created_by: row.created_by,
            company_id: row.company_id,
            created_at: row.created_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> RepoResult<Vec<T>>
where
    T: TryFrom<R, Error = RepositoryError>,
{
    rows.into_iter().map(T::try_from).collect()
}

async fn insert_workflow<'e, E>(executor: E, workflow: &WorkflowDefinition) -> RepoResult<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workflows (
            id, company_id, name, description, trigger_type, trigger_config, conditions, actions,
            status, scope, scope_id, owner_id, template_id, execution_count, max_executions,
            last_executed_at, is_deleted, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        "#,
    )
    .bind(workflow.id)
    .bind(workflow.company_id)
    .bind(&workflow.name)
    .bind(&workflow.description)
    .bind(workflow.trigger_type.as_str())
    .bind(&workflow.trigger_config)
    .bind(encode("workflow", &workflow.conditions)?)
    .bind(encode("workflow", &workflow.actions)?)
    .bind(workflow.status)
    .bind(workflow.scope)
    .bind(workflow.scope_id)
    .bind(workflow.owner_id)
    .bind(workflow.template_id)
    .bind(workflow.execution_count)
    .bind(workflow.max_executions)
    .bind(workflow.last_executed_at)
    .bind(workflow.is_deleted)
    .bind(workflow.created_at)
    .bind(workflow.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl WorkflowRepository for PgWorkflowRepository {
    async fn create_workflow(&self, workflow: &WorkflowDefinition) -> RepoResult<()> {
        insert_workflow(&self.pool, workflow).await
    }

    async fn get_workflow(&self, company_id: Uuid, id: Uuid) -> RepoResult<WorkflowDefinition> {
        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = $1 AND company_id = $2 AND NOT is_deleted"
        ))
        .bind(id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("Workflow".to_string()))?;

        row.try_into()
    }

    async fn list_workflows(
        &self,
        company_id: Uuid,
        filter: WorkflowFilter,
        page: Page,
    ) -> RepoResult<(Vec<WorkflowDefinition>, i64)> {
        let where_clause = r#"
            WHERE company_id = $1 AND NOT is_deleted
              AND ($2::workflow_status IS NULL OR status = $2)
              AND ($3::text IS NULL OR trigger_type = $3)
        "#;
        let trigger = filter.trigger_type.map(|t| t.as_str());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM workflows {where_clause}"))
            .bind(company_id)
            .bind(filter.status)
            .bind(trigger)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows {where_clause} ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(company_id)
        .bind(filter.status)
        .bind(trigger)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((collect(rows)?, total))
    }

    async fn update_workflow(&self, workflow: &WorkflowDefinition) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET name = $3, description = $4, trigger_type = $5, trigger_config = $6,
                conditions = $7, actions = $8, scope = $9, scope_id = $10,
                max_executions = $11, updated_at = NOW()
            WHERE id = $1 AND company_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(workflow.id)
        .bind(workflow.company_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.trigger_type.as_str())
        .bind(&workflow.trigger_config)
        .bind(encode("workflow", &workflow.conditions)?)
        .bind(encode("workflow", &workflow.actions)?)
        .bind(workflow.scope)
        .bind(workflow.scope_id)
        .bind(workflow.max_executions)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Workflow".to_string()));
        }
        Ok(())
    }

    async fn set_status(&self, company_id: Uuid, id: Uuid, status: WorkflowStatus) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE workflows SET status = $3, updated_at = NOW() WHERE id = $1 AND company_id = $2 AND NOT is_deleted",
        )
        .bind(id)
        .bind(company_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Workflow".to_string()));
        }
        Ok(())
    }

    async fn soft_delete(&self, company_id: Uuid, id: Uuid) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET is_deleted = true, status = 'INACTIVE', updated_at = NOW()
            WHERE id = $1 AND company_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Workflow".to_string()));
        }
        Ok(())
    }

    async fn name_exists(&self, company_id: Uuid, name: &str, excluding: Option<Uuid>) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM workflows
                WHERE company_id = $1 AND name = $2 AND NOT is_deleted
                  AND ($3::uuid IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(company_id)
        .bind(name)
        .bind(excluding)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn find_active_by_trigger(
        &self,
        trigger_type: TriggerType,
        scope: Option<OwnerScope>,
    ) -> RepoResult<Vec<WorkflowDefinition>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            r#"
            SELECT {WORKFLOW_COLUMNS} FROM workflows
            WHERE trigger_type = $1 AND status = 'ACTIVE' AND NOT is_deleted
              AND ($2::uuid IS NULL OR (
                    company_id = $2 AND (
                        scope = 'company'
                        OR (scope = 'team' AND scope_id = $3)
                        OR (scope = 'user' AND scope_id = $4)
                    )
              ))
            ORDER BY created_at
            "#
        ))
        .bind(trigger_type.as_str())
        .bind(scope.map(|s| s.company_id))
        .bind(scope.and_then(|s| s.team_id))
        .bind(scope.and_then(|s| s.user_id))
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn claim_execution(&self, workflow_id: Uuid) -> RepoResult<SlotClaim> {
        let claimed: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE workflows
            SET execution_count = execution_count + 1
            WHERE id = $1 AND (max_executions IS NULL OR execution_count < max_executions)
            RETURNING execution_count
            "#,
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_some() {
            return Ok(SlotClaim::Claimed);
        }

        let (count, max) = sqlx::query_as::<_, (i64, Option<i64>)>(
            "SELECT execution_count, max_executions FROM workflows WHERE id = $1",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("Workflow".to_string()))?;

        Ok(SlotClaim::CapReached {
            count,
            max: max.unwrap_or(count),
        })
    }

    async fn release_execution(&self, workflow_id: Uuid) -> RepoResult<()> {
        sqlx::query("UPDATE workflows SET execution_count = GREATEST(execution_count - 1, 0) WHERE id = $1")
            .bind(workflow_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_executed(&self, workflow_id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        sqlx::query("UPDATE workflows SET last_executed_at = $2 WHERE id = $1")
            .bind(workflow_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_execution(&self, record: &ExecutionRecord) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions (
                id, workflow_id, company_id, status, trigger_type, trigger_data, action_log,
                success_count, failure_count, started_at, completed_at, duration_ms, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(record.workflow_id)
        .bind(record.company_id)
        .bind(record.status)
        .bind(record.trigger_type.as_str())
        .bind(&record.trigger_data)
        .bind(encode("execution", &record.action_log)?)
        .bind(record.success_count)
        .bind(record.failure_count)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(record.duration_ms)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finalize_execution(&self, record: &ExecutionRecord) -> RepoResult<()> {
        // only a running record can be finalized
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2, action_log = $3, success_count = $4, failure_count = $5,
                completed_at = $6, duration_ms = $7, error_message = $8
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(record.id)
        .bind(record.status)
        .bind(encode("execution", &record.action_log)?)
        .bind(record.success_count)
        .bind(record.failure_count)
        .bind(record.completed_at)
        .bind(record.duration_ms)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "execution {} is not running",
                record.id
            )));
        }
        Ok(())
    }

    async fn list_executions(&self, workflow_id: Uuid, page: Page) -> RepoResult<(Vec<ExecutionRecord>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflow_executions WHERE workflow_id = $1")
            .bind(workflow_id)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE workflow_id = $1 ORDER BY started_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(workflow_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((collect(rows)?, total))
    }

    async fn get_template(&self, id: Uuid) -> RepoResult<WorkflowTemplate> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM workflow_templates WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("Workflow template".to_string()))?;

        row.try_into()
    }

    async fn list_templates(
        &self,
        company_id: Uuid,
        category: Option<TemplateCategory>,
    ) -> RepoResult<Vec<WorkflowTemplate>> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            r#"
            SELECT {TEMPLATE_COLUMNS} FROM workflow_templates
            WHERE (is_global OR company_id = $1)
              AND ($2::template_category IS NULL OR category = $2)
            ORDER BY usage_count DESC, name
            "#
        ))
        .bind(company_id)
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn create_template(&self, template: &WorkflowTemplate) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_templates (
                id, name, description, category, trigger_type, trigger_config, actions, conditions,
                tags, usage_count, is_global, created_by, company_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(template.category)
        .bind(template.trigger_type.as_str())
        .bind(&template.trigger_config)
        .bind(encode("template", &template.actions)?)
        .bind(encode("template", &template.conditions)?)
        .bind(&template.tags)
        .bind(template.usage_count)
        .bind(template.is_global)
        .bind(template.created_by)
        .bind(template.company_id)
        .bind(template.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_from_template(
        &self,
        workflow: &WorkflowDefinition,
        instantiation: &TemplateInstantiation,
    ) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        insert_workflow(&mut *tx, workflow).await?;

        sqlx::query(
            r#"
            INSERT INTO workflow_template_instantiations (id, template_id, workflow_id, company_id, instantiated_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(instantiation.id)
        .bind(instantiation.template_id)
        .bind(instantiation.workflow_id)
        .bind(instantiation.company_id)
        .bind(instantiation.instantiated_by)
        .bind(instantiation.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE workflow_templates SET usage_count = usage_count + 1 WHERE id = $1")
            .bind(instantiation.template_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
