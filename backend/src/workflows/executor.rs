// Workflow Executor - registry that routes action steps to their handlers

use automation_shared::{ActionStep, ActionType, WorkflowDefinition};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::actions::{
    ActionContext, ActionHandler, AddTagAction, CallWebhookAction, CreateDealAction, CreateTaskAction,
    SendEmailAction, SendNotificationAction, UpdateFieldAction, WaitAction,
};
use super::errors::{ActionExecutionError, UnknownActionError, ValidationError};
use super::providers::{EmailSender, EntityMutator, NotificationSender, WebhookCaller};

/// The side-effect collaborators the built-in handlers need
#[derive(Clone)]
pub struct ActionProviders {
    pub email: Arc<dyn EmailSender>,
    pub notifications: Arc<dyn NotificationSender>,
    pub entities: Arc<dyn EntityMutator>,
    pub webhooks: Arc<dyn WebhookCaller>,
}

/// Why a step could not produce output
#[derive(Debug)]
pub enum StepError {
    Failed(ActionExecutionError),
    Unregistered(UnknownActionError),
}

#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a handler for every built-in action kind
    pub fn with_defaults(providers: ActionProviders) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SendEmailAction::new(providers.email)));
        registry.register(Arc::new(CreateTaskAction::new(providers.entities.clone())));
        registry.register(Arc::new(UpdateFieldAction::new(providers.entities.clone())));
        registry.register(Arc::new(SendNotificationAction::new(providers.notifications)));
        registry.register(Arc::new(CreateDealAction::new(providers.entities.clone())));
        registry.register(Arc::new(AddTagAction::new(providers.entities)));
        registry.register(Arc::new(CallWebhookAction::new(providers.webhooks)));
        registry.register(Arc::new(WaitAction));
        registry
    }

    /// Replaces any handler already registered for the same kind
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.action_type(), handler);
    }

    pub fn handler(&self, action_type: ActionType) -> Result<&Arc<dyn ActionHandler>, UnknownActionError> {
        self.handlers
            .get(&action_type)
            .ok_or_else(|| UnknownActionError(action_type.to_string()))
    }

    /// Schema check for one step of a definition or template being saved
    pub fn validate_step(&self, index: usize, step: &ActionStep) -> Result<(), ValidationError> {
        let handler = self.handler(step.action_type)?;
        handler
            .validate(&step.config)
            .map_err(|reason| ValidationError::InvalidActionConfig {
                step: index,
                action: step.action_type,
                reason,
            })
    }

    pub fn validate_steps(&self, steps: &[ActionStep]) -> Result<(), ValidationError> {
        if steps.is_empty() {
            return Err(ValidationError::field("actions", "at least one action step is required"));
        }
        steps
            .iter()
            .enumerate()
            .try_for_each(|(index, step)| self.validate_step(index, step))
    }

    /// Run one already-resolved step
    pub async fn execute(
        &self,
        action_type: ActionType,
        config: &Value,
        trigger_data: &Value,
        workflow: &WorkflowDefinition,
    ) -> Result<Value, StepError> {
        let handler = self.handler(action_type).map_err(StepError::Unregistered)?;
        debug!(workflow_id = %workflow.id, action = %action_type, "Executing action");

        let ctx = ActionContext { workflow, trigger_data };
        handler.execute(config, &ctx).await.map_err(StepError::Failed)
    }
}
