// Workflow Actions - typed handlers for every action kind a step can run

use async_trait::async_trait;
use automation_shared::{ActionType, WorkflowDefinition};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use super::errors::ActionExecutionError;
use super::providers::{EmailSender, EntityMutator, NotificationSender, Severity, WebhookCaller};
use super::variables::has_placeholder;

const WEBHOOK_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Ten years
const MAX_DUE_IN_HOURS: u64 = 87_600;
/// One year
const MAX_WAIT_SECONDS: u64 = 31_536_000;

/// What a handler can see besides its own (already resolved) config
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub workflow: &'a WorkflowDefinition,
    pub trigger_data: &'a Value,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action_type(&self) -> ActionType;

    /// Check the raw config when a definition or template is saved.
    ///
    /// Placeholder values satisfy presence checks; type checks apply only
    /// to literal values.
    fn validate(&self, config: &Value) -> Result<(), String>;

    async fn execute(&self, config: &Value, ctx: &ActionContext<'_>) -> Result<Value, ActionExecutionError>;
}

// ---- config helpers ----

fn present<'v>(config: &'v Value, key: &str) -> Option<&'v Value> {
    config.get(key).filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn require(config: &Value, keys: &[&str]) -> Result<(), String> {
    if !config.is_object() {
        return Err("config must be an object".to_string());
    }
    match keys.iter().find(|k| present(config, k).is_none()) {
        Some(missing) => Err(format!("missing required key '{}'", missing)),
        None => Ok(()),
    }
}

/// The value at `key` when it is a literal (no placeholders)
fn literal<'v>(config: &'v Value, key: &str) -> Option<&'v Value> {
    present(config, key).filter(|v| !has_placeholder(v))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn required_text(config: &Value, key: &str, action: ActionType) -> Result<String, ActionExecutionError> {
    present(config, key)
        .map(text)
        .ok_or_else(|| ActionExecutionError::new(action, format!("missing required key '{}'", key)))
}

fn optional_text(config: &Value, key: &str) -> Option<String> {
    present(config, key).map(text)
}

fn non_negative_int(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn int_at_most(max: u64) -> impl Fn(&Value) -> Option<u64> {
    move |value| non_negative_int(value).filter(|n| *n <= max)
}

fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn check_literal<T>(
    config: &Value,
    key: &str,
    parse: impl Fn(&Value) -> Option<T>,
    expected: &str,
) -> Result<(), String> {
    match literal(config, key) {
        Some(v) if parse(v).is_none() => Err(format!("'{}' must be {}", key, expected)),
        _ => Ok(()),
    }
}

// ---- send_email ----

pub struct SendEmailAction {
    sender: Arc<dyn EmailSender>,
}

impl SendEmailAction {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ActionHandler for SendEmailAction {
    fn action_type(&self) -> ActionType {
        ActionType::SendEmail
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        require(config, &["to", "subject", "body"])?;
        check_literal(
            config,
            "to",
            |v| v.as_str().filter(|s| s.contains('@')).map(|_| ()),
            "an email address",
        )
    }

    async fn execute(&self, config: &Value, _ctx: &ActionContext<'_>) -> Result<Value, ActionExecutionError> {
        let action = self.action_type();
        let to = required_text(config, "to", action)?;
        let subject = required_text(config, "subject", action)?;
        let body = required_text(config, "body", action)?;

        self.sender
            .send(&to, &subject, &body)
            .await
            .map_err(|e| ActionExecutionError::new(action, e.to_string()))?;

        Ok(json!({ "sent_to": to, "subject": subject }))
    }
}

// ---- create_task ----

pub struct CreateTaskAction {
    entities: Arc<dyn EntityMutator>,
}

impl CreateTaskAction {
    pub fn new(entities: Arc<dyn EntityMutator>) -> Self {
        Self { entities }
    }
}

#[async_trait]
impl ActionHandler for CreateTaskAction {
    fn action_type(&self) -> ActionType {
        ActionType::CreateTask
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        require(config, &["title"])?;
        check_literal(
            config,
            "due_in_hours",
            int_at_most(MAX_DUE_IN_HOURS),
            &format!("an integer between 0 and {}", MAX_DUE_IN_HOURS),
        )
    }

    async fn execute(&self, config: &Value, ctx: &ActionContext<'_>) -> Result<Value, ActionExecutionError> {
        let action = self.action_type();
        let title = required_text(config, "title", action)?;

        let due_at = match present(config, "due_in_hours") {
            Some(v) => {
                let due_at = int_at_most(MAX_DUE_IN_HOURS)(v)
                    .and_then(|hours| i64::try_from(hours).ok())
                    .and_then(Duration::try_hours)
                    .and_then(|offset| Utc::now().checked_add_signed(offset))
                    .ok_or_else(|| {
                        ActionExecutionError::new(
                            action,
                            format!("'due_in_hours' must be an integer between 0 and {}", MAX_DUE_IN_HOURS),
                        )
                    })?;
                Some(due_at)
            }
            None => None,
        };

        let assigned_to = optional_text(config, "assigned_to").unwrap_or_else(|| ctx.workflow.owner_id.to_string());

        let attributes = json!({
            "title": title,
            "description": optional_text(config, "description"),
            "assigned_to": assigned_to,
            "due_at": due_at,
            "company_id": ctx.workflow.company_id,
            "created_by_workflow": ctx.workflow.id
        });

        let task_id = self
            .entities
            .create("task", &attributes)
            .await
            .map_err(|e| ActionExecutionError::new(action, e.to_string()))?;

        Ok(json!({ "task_id": task_id, "assigned_to": assigned_to, "due_at": due_at }))
    }
}

// ---- update_field ----

pub struct UpdateFieldAction {
    entities: Arc<dyn EntityMutator>,
}

impl UpdateFieldAction {
    pub fn new(entities: Arc<dyn EntityMutator>) -> Self {
        Self { entities }
    }
}

#[async_trait]
impl ActionHandler for UpdateFieldAction {
    fn action_type(&self) -> ActionType {
        ActionType::UpdateField
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        require(config, &["object_kind", "object_id", "field"])?;
        // an explicit null is a valid value to write
        if config.get("value").is_none() {
            return Err("missing required key 'value'".to_string());
        }
        Ok(())
    }

    async fn execute(&self, config: &Value, _ctx: &ActionContext<'_>) -> Result<Value, ActionExecutionError> {
        let action = self.action_type();
        let kind = required_text(config, "object_kind", action)?;
        let id = required_text(config, "object_id", action)?;
        let field = required_text(config, "field", action)?;
        let value = config
            .get("value")
            .ok_or_else(|| ActionExecutionError::new(action, "missing required key 'value'"))?;

        self.entities
            .update_field(&kind, &id, &field, value)
            .await
            .map_err(|e| ActionExecutionError::new(action, e.to_string()))?;

        Ok(json!({ "object_kind": kind, "object_id": id, "field": field, "value": value }))
    }
}

// ---- send_notification ----

pub struct SendNotificationAction {
    notifications: Arc<dyn NotificationSender>,
}

impl SendNotificationAction {
    pub fn new(notifications: Arc<dyn NotificationSender>) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl ActionHandler for SendNotificationAction {
    fn action_type(&self) -> ActionType {
        ActionType::SendNotification
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        require(config, &["recipient", "message"])?;
        check_literal(
            config,
            "severity",
            |v| v.as_str().and_then(|s| s.parse::<Severity>().ok()),
            "one of info, success, warning, error",
        )
    }

    async fn execute(&self, config: &Value, _ctx: &ActionContext<'_>) -> Result<Value, ActionExecutionError> {
        let action = self.action_type();
        let recipient = required_text(config, "recipient", action)?;
        let message = required_text(config, "message", action)?;
        let severity = match optional_text(config, "severity") {
            Some(s) => s
                .parse::<Severity>()
                .map_err(|e| ActionExecutionError::new(action, e))?,
            None => Severity::default(),
        };

        let notification_id = self
            .notifications
            .notify(&recipient, &message, severity)
            .await
            .map_err(|e| ActionExecutionError::new(action, e.to_string()))?;

        Ok(json!({
            "notification_id": notification_id,
            "recipient": recipient,
            "severity": severity
        }))
    }
}

// ---- create_deal ----

pub struct CreateDealAction {
    entities: Arc<dyn EntityMutator>,
}

impl CreateDealAction {
    pub fn new(entities: Arc<dyn EntityMutator>) -> Self {
        Self { entities }
    }
}

#[async_trait]
impl ActionHandler for CreateDealAction {
    fn action_type(&self) -> ActionType {
        ActionType::CreateDeal
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        require(config, &["title", "value", "stage"])?;
        check_literal(config, "value", parse_amount, "a number")
    }

    async fn execute(&self, config: &Value, ctx: &ActionContext<'_>) -> Result<Value, ActionExecutionError> {
        let action = self.action_type();
        let title = required_text(config, "title", action)?;
        let stage = required_text(config, "stage", action)?;
        let value = present(config, "value")
            .and_then(parse_amount)
            .ok_or_else(|| ActionExecutionError::new(action, "'value' must be a number"))?;

        let attributes = json!({
            "title": title,
            "value": value.to_string(),
            "stage": stage,
            "contact_id": optional_text(config, "contact_id"),
            "owner_id": ctx.workflow.owner_id,
            "company_id": ctx.workflow.company_id,
            "created_by_workflow": ctx.workflow.id
        });

        let deal_id = self
            .entities
            .create("deal", &attributes)
            .await
            .map_err(|e| ActionExecutionError::new(action, e.to_string()))?;

        Ok(json!({ "deal_id": deal_id, "value": value.to_string(), "stage": stage }))
    }
}

// ---- add_tag ----

pub struct AddTagAction {
    entities: Arc<dyn EntityMutator>,
}

impl AddTagAction {
    pub fn new(entities: Arc<dyn EntityMutator>) -> Self {
        Self { entities }
    }
}

#[async_trait]
impl ActionHandler for AddTagAction {
    fn action_type(&self) -> ActionType {
        ActionType::AddTag
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        require(config, &["object_kind", "object_id", "tag"])
    }

    async fn execute(&self, config: &Value, _ctx: &ActionContext<'_>) -> Result<Value, ActionExecutionError> {
        let action = self.action_type();
        let kind = required_text(config, "object_kind", action)?;
        let id = required_text(config, "object_id", action)?;
        let tag = required_text(config, "tag", action)?;

        self.entities
            .add_tag(&kind, &id, &tag)
            .await
            .map_err(|e| ActionExecutionError::new(action, e.to_string()))?;

        Ok(json!({ "object_kind": kind, "object_id": id, "tag": tag }))
    }
}

// ---- call_webhook ----

pub struct CallWebhookAction {
    caller: Arc<dyn WebhookCaller>,
}

impl CallWebhookAction {
    pub fn new(caller: Arc<dyn WebhookCaller>) -> Self {
        Self { caller }
    }
}

fn webhook_url(value: &Value) -> Option<url::Url> {
    value
        .as_str()
        .and_then(|s| url::Url::parse(s).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

fn webhook_method(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(|s| s.trim().to_uppercase())
        .filter(|m| WEBHOOK_METHODS.contains(&m.as_str()))
}

#[async_trait]
impl ActionHandler for CallWebhookAction {
    fn action_type(&self) -> ActionType {
        ActionType::CallWebhook
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        require(config, &["url"])?;
        check_literal(config, "url", webhook_url, "an http(s) URL")?;
        check_literal(config, "method", webhook_method, "one of GET, POST, PUT, PATCH, DELETE")?;
        match config.get("headers") {
            None | Some(Value::Null) | Some(Value::Object(_)) => Ok(()),
            Some(_) => Err("'headers' must be an object".to_string()),
        }
    }

    async fn execute(&self, config: &Value, _ctx: &ActionContext<'_>) -> Result<Value, ActionExecutionError> {
        let action = self.action_type();
        let url = present(config, "url")
            .and_then(webhook_url)
            .ok_or_else(|| ActionExecutionError::new(action, "'url' must be an http(s) URL"))?;
        let method = match present(config, "method") {
            Some(m) => webhook_method(m)
                .ok_or_else(|| ActionExecutionError::new(action, format!("unsupported method {}", m)))?,
            None => "POST".to_string(),
        };

        let headers: HashMap<String, String> = config
            .get("headers")
            .and_then(Value::as_object)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), text(v))).collect())
            .unwrap_or_default();
        let body = config.get("body").cloned().unwrap_or(Value::Null);

        let response = self
            .caller
            .call(url.as_str(), &method, &headers, &body)
            .await
            .map_err(|e| ActionExecutionError::new(action, e.to_string()))?;

        if !response.is_success() {
            return Err(ActionExecutionError::new(
                action,
                format!("{} {} returned status {}", method, url, response.status),
            ));
        }

        Ok(json!({
            "url": url.as_str(),
            "method": method,
            "status_code": response.status,
            "response_body": response.body
        }))
    }
}

// ---- wait ----

/// Records the requested delay; the pipeline does not suspend
pub struct WaitAction;

impl WaitAction {
    fn duration_seconds(config: &Value) -> Option<u64> {
        let seconds = match present(config, "duration_seconds") {
            Some(v) => non_negative_int(v)?,
            None => present(config, "duration_minutes")
                .and_then(non_negative_int)?
                .checked_mul(60)?,
        };
        Some(seconds).filter(|s| *s <= MAX_WAIT_SECONDS)
    }
}

#[async_trait]
impl ActionHandler for WaitAction {
    fn action_type(&self) -> ActionType {
        ActionType::Wait
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        if present(config, "duration_seconds").is_none() && present(config, "duration_minutes").is_none() {
            return Err("missing required key 'duration_seconds' or 'duration_minutes'".to_string());
        }
        check_literal(
            config,
            "duration_seconds",
            int_at_most(MAX_WAIT_SECONDS),
            &format!("an integer between 0 and {}", MAX_WAIT_SECONDS),
        )?;
        check_literal(
            config,
            "duration_minutes",
            int_at_most(MAX_WAIT_SECONDS / 60),
            &format!("an integer between 0 and {}", MAX_WAIT_SECONDS / 60),
        )
    }

    async fn execute(&self, config: &Value, ctx: &ActionContext<'_>) -> Result<Value, ActionExecutionError> {
        let seconds = Self::duration_seconds(config).ok_or_else(|| {
            ActionExecutionError::new(
                ActionType::Wait,
                format!("duration must be an integer between 0 and {} seconds", MAX_WAIT_SECONDS),
            )
        })?;

        info!(
            workflow_id = %ctx.workflow.id,
            duration_seconds = seconds,
            "Wait step reached; continuing without delay"
        );

        Ok(json!({ "waited": false, "duration_seconds": seconds }))
    }
}
