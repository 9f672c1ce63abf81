// Workflow Automation Engine
//
// Trigger/condition/action pipeline for the CRM: domain events and schedules
// start workflow definitions, whose ordered action steps run with variable
// substitution and leave an execution record behind.

pub mod actions;
pub mod conditions;
pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod postgres;
pub mod providers;
pub mod repository;
pub mod service;
pub mod templates;
pub mod triggers;
pub mod variables;

pub use actions::{ActionContext, ActionHandler};
pub use dispatcher::{DispatchQueue, TriggerDispatcher};
pub use engine::ExecutionEngine;
pub use errors::{
    ActionExecutionError, DispatchError, RepositoryError, UnknownActionError, ValidationError, WorkflowError,
    WorkflowExecutionError,
};
pub use executor::{ActionProviders, ActionRegistry};
pub use postgres::PgWorkflowRepository;
pub use providers::{EmailSender, EntityMutator, NotificationSender, ProviderError, Severity, WebhookCaller, WebhookResponse};
pub use repository::{Page, SlotClaim, WorkflowFilter, WorkflowRepository};
pub use service::{NewTemplate, NewWorkflow, WorkflowService, WorkflowUpdate};
pub use templates::{InstantiationOptions, TemplateInstantiator};
pub use triggers::{OwnerScope, TriggerEvent};
