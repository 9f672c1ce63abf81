use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when a stored or submitted tag does not name a known variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Domain events (and the two non-event entry points) a workflow can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    EntityCreated,
    EntityUpdated,
    StageChanged,
    EmailOpened,
    EmailClicked,
    TicketCreated,
    FormSubmitted,
    Scheduled,
    Manual,
}

impl TriggerType {
    pub const ALL: [TriggerType; 9] = [
        TriggerType::EntityCreated,
        TriggerType::EntityUpdated,
        TriggerType::StageChanged,
        TriggerType::EmailOpened,
        TriggerType::EmailClicked,
        TriggerType::TicketCreated,
        TriggerType::FormSubmitted,
        TriggerType::Scheduled,
        TriggerType::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityCreated => "entity_created",
            Self::EntityUpdated => "entity_updated",
            Self::StageChanged => "stage_changed",
            Self::EmailOpened => "email_opened",
            Self::EmailClicked => "email_clicked",
            Self::TicketCreated => "ticket_created",
            Self::FormSubmitted => "form_submitted",
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| UnknownVariant {
                kind: "trigger type",
                value: s.to_string(),
            })
    }
}

/// The closed set of action kinds a workflow step can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendEmail,
    CreateTask,
    UpdateField,
    SendNotification,
    CreateDeal,
    AddTag,
    CallWebhook,
    Wait,
}

impl ActionType {
    pub const ALL: [ActionType; 8] = [
        ActionType::SendEmail,
        ActionType::CreateTask,
        ActionType::UpdateField,
        ActionType::SendNotification,
        ActionType::CreateDeal,
        ActionType::AddTag,
        ActionType::CallWebhook,
        ActionType::Wait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail => "send_email",
            Self::CreateTask => "create_task",
            Self::UpdateField => "update_field",
            Self::SendNotification => "send_notification",
            Self::CreateDeal => "create_deal",
            Self::AddTag => "add_tag",
            Self::CallWebhook => "call_webhook",
            Self::Wait => "wait",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| UnknownVariant {
                kind: "action type",
                value: s.to_string(),
            })
    }
}

/// One configured unit of work inside a workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ActionStep {
    pub fn new(action_type: ActionType, config: serde_json::Value) -> Self {
        Self {
            action_type,
            config,
            name: None,
        }
    }

    pub fn send_email(to: &str, subject: &str, body: &str) -> Self {
        Self::new(
            ActionType::SendEmail,
            serde_json::json!({ "to": to, "subject": subject, "body": body }),
        )
    }

    pub fn create_task(title: &str, due_in_hours: Option<i64>, assigned_to: Option<&str>) -> Self {
        let mut config = serde_json::json!({ "title": title });
        if let Some(hours) = due_in_hours {
            config["due_in_hours"] = serde_json::json!(hours);
        }
        if let Some(assignee) = assigned_to {
            config["assigned_to"] = serde_json::json!(assignee);
        }
        Self::new(ActionType::CreateTask, config)
    }

    pub fn update_field(object_kind: &str, object_id: &str, field: &str, value: serde_json::Value) -> Self {
        Self::new(
            ActionType::UpdateField,
            serde_json::json!({
                "object_kind": object_kind,
                "object_id": object_id,
                "field": field,
                "value": value
            }),
        )
    }

    pub fn send_notification(recipient: &str, message: &str, severity: &str) -> Self {
        Self::new(
            ActionType::SendNotification,
            serde_json::json!({ "recipient": recipient, "message": message, "severity": severity }),
        )
    }

    pub fn create_deal(title: &str, value: serde_json::Value, stage: &str) -> Self {
        Self::new(
            ActionType::CreateDeal,
            serde_json::json!({ "title": title, "value": value, "stage": stage }),
        )
    }

    pub fn add_tag(object_kind: &str, object_id: &str, tag: &str) -> Self {
        Self::new(
            ActionType::AddTag,
            serde_json::json!({ "object_kind": object_kind, "object_id": object_id, "tag": tag }),
        )
    }

    pub fn call_webhook(url: &str, method: &str, body: Option<serde_json::Value>) -> Self {
        Self::new(
            ActionType::CallWebhook,
            serde_json::json!({ "url": url, "method": method, "headers": {}, "body": body }),
        )
    }

    pub fn wait(duration_seconds: u64) -> Self {
        Self::new(
            ActionType::Wait,
            serde_json::json!({ "duration_seconds": duration_seconds }),
        )
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "workflow_status", rename_all = "UPPERCASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkflowStatus {
    Active,
    Paused,
    Inactive,
}

impl WorkflowStatus {
    pub fn is_runnable(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// The run-state toggle only flips between ACTIVE and PAUSED
    pub fn toggled(&self) -> Option<WorkflowStatus> {
        match self {
            Self::Active => Some(Self::Paused),
            Self::Paused => Some(Self::Active),
            Self::Inactive => None,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Inactive => "INACTIVE",
        };
        f.write_str(s)
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "workflow_scope", rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowScope {
    Company,
    Team,
    User,
}

/// Flat comparison operators; there is deliberately no nesting or boolean algebra
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEquals,
    LessThan,
    LessThanOrEquals,
    Contains,
    IsEmpty,
    IsNotEmpty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the trigger data
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Condition {
    pub fn new(field: &str, operator: ConditionOperator, value: serde_json::Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }

    pub fn equals(field: &str, value: serde_json::Value) -> Self {
        Self::new(field, ConditionOperator::Equals, value)
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::GreaterThan, serde_json::json!(value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    pub trigger_config: serde_json::Value,
    pub conditions: Vec<Condition>,
    pub actions: Vec<ActionStep>,
    pub status: WorkflowStatus,
    pub scope: WorkflowScope,
    pub scope_id: Option<Uuid>,
    pub owner_id: Uuid,
    pub template_id: Option<Uuid>,
    pub execution_count: i64,
    pub max_executions: Option<i64>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    /// Only ACTIVE, non-deleted definitions may run
    pub fn is_eligible(&self) -> bool {
        self.status.is_runnable() && !self.is_deleted
    }

    pub fn cap_reached(&self) -> bool {
        self.max_executions
            .map(|max| self.execution_count >= max)
            .unwrap_or(false)
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "execution_status", rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

/// Outcome of one attempted action step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub step: usize,
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Configuration after variable substitution
    pub config: serde_json::Value,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub company_id: Uuid,
    pub status: ExecutionStatus,
    pub trigger_type: TriggerType,
    pub trigger_data: serde_json::Value,
    pub action_log: Vec<ActionLogEntry>,
    pub success_count: i32,
    pub failure_count: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    /// A fresh record in `running` state for the given workflow
    pub fn start(workflow: &WorkflowDefinition, trigger_type: TriggerType, trigger_data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            company_id: workflow.company_id,
            status: ExecutionStatus::Running,
            trigger_type,
            trigger_data,
            action_log: Vec::new(),
            success_count: 0,
            failure_count: 0,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            error_message: None,
        }
    }

    pub fn attempted(&self) -> usize {
        (self.success_count + self.failure_count) as usize
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "template_category", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    Sales,
    Marketing,
    Support,
    Onboarding,
    FollowUp,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: TemplateCategory,
    pub trigger_type: TriggerType,
    pub trigger_config: serde_json::Value,
    pub actions: Vec<ActionStep>,
    pub conditions: Vec<Condition>,
    pub tags: Vec<String>,
    pub usage_count: i64,
    pub is_global: bool,
    pub created_by: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    /// Global templates are visible to every tenant, others only to their owner
    pub fn visible_to(&self, company_id: Uuid) -> bool {
        self.is_global || self.company_id == Some(company_id)
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateInstantiation {
    pub id: Uuid,
    pub template_id: Uuid,
    pub workflow_id: Uuid,
    pub company_id: Uuid,
    pub instantiated_by: Uuid,
    pub created_at: DateTime<Utc>,
}
