// Workflow Triggers - domain events that can start workflow execution

use automation_shared::{TriggerType, WorkflowDefinition, WorkflowScope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::variables::get_path;

/// Payload for trigger events
pub type EventPayload = serde_json::Value;

/// trigger_config keys that tune behavior rather than filter events
const RESERVED_CONFIG_KEYS: &[&str] = &["interval_minutes"];

/// Longest accepted schedule interval: one year
pub const MAX_INTERVAL_MINUTES: i64 = 525_600;

/// Narrows dispatch to definitions owned by a company, team or user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerScope {
    pub company_id: Uuid,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

impl OwnerScope {
    pub fn company(company_id: Uuid) -> Self {
        Self {
            company_id,
            team_id: None,
            user_id: None,
        }
    }

    pub fn with_team(mut self, team_id: Uuid) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Whether a definition falls inside this scope
    pub fn matches(&self, workflow: &WorkflowDefinition) -> bool {
        if workflow.company_id != self.company_id {
            return false;
        }
        match workflow.scope {
            WorkflowScope::Company => true,
            WorkflowScope::Team => workflow.scope_id.is_some() && workflow.scope_id == self.team_id,
            WorkflowScope::User => workflow.scope_id.is_some() && workflow.scope_id == self.user_id,
        }
    }
}

/// A trigger event that can initiate workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub trigger_type: TriggerType,
    pub trigger_data: EventPayload,
    #[serde(default)]
    pub owner_scope: Option<OwnerScope>,
    pub occurred_at: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(trigger_type: TriggerType, trigger_data: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trigger_type,
            trigger_data,
            owner_scope: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_scope(mut self, scope: OwnerScope) -> Self {
        self.owner_scope = Some(scope);
        self
    }

    pub fn email_opened(email_id: Uuid, contact: serde_json::Value) -> Self {
        Self::new(
            TriggerType::EmailOpened,
            serde_json::json!({ "email_id": email_id, "contact": contact }),
        )
    }

    /// Payload for an on-demand run. Supplied object keys are kept alongside
    /// the synthesized `manual` block; any other non-null value lands under `input`.
    pub fn manual(workflow_id: Uuid, triggered_by: Uuid, supplied: serde_json::Value) -> Self {
        let mut data = match supplied {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("input".to_string(), other);
                map
            }
        };
        data.insert(
            "manual".to_string(),
            serde_json::json!({
                "triggered_by": triggered_by,
                "triggered_at": Utc::now(),
                "workflow_id": workflow_id
            }),
        );
        Self::new(TriggerType::Manual, serde_json::Value::Object(data))
    }

    /// Synthetic payload produced by the scheduler for one due definition
    pub fn scheduled(workflow_id: Uuid, fired_at: DateTime<Utc>, interval_minutes: i64) -> Self {
        Self::new(
            TriggerType::Scheduled,
            serde_json::json!({
                "schedule": {
                    "workflow_id": workflow_id,
                    "fired_at": fired_at,
                    "interval_minutes": interval_minutes
                }
            }),
        )
    }
}

/// Every non-reserved key in `config` must be present in the event data and equal
pub fn matches_trigger_config(config: &serde_json::Value, trigger_data: &EventPayload) -> bool {
    let Some(filters) = config.as_object() else {
        return true;
    };

    filters
        .iter()
        .filter(|(key, _)| !RESERVED_CONFIG_KEYS.contains(&key.as_str()))
        .all(|(key, expected)| {
            get_path(trigger_data, key)
                .or_else(|| trigger_data.get(key))
                .map(|actual| actual == expected)
                .unwrap_or(false)
        })
}
