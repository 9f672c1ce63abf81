// Workflow Errors - typed failures for each stage of the automation pipeline

use automation_shared::{ActionType, UnknownVariant};
use thiserror::Error;

/// Rejected input at creation or configuration time. Never retried.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("unknown trigger type '{0}'")]
    UnknownTriggerType(String),
    #[error(transparent)]
    UnknownAction(#[from] UnknownActionError),
    #[error("action step {step} ({action}): {reason}")]
    InvalidActionConfig {
        step: usize,
        action: ActionType,
        reason: String,
    },
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}

impl ValidationError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Field name used when reporting this error in a validation response
    pub fn field_name(&self) -> String {
        match self {
            Self::UnknownTriggerType(_) => "trigger_type".to_string(),
            Self::UnknownAction(_) => "actions".to_string(),
            Self::InvalidActionConfig { step, .. } => format!("actions[{}].config", step),
            Self::InvalidField { field, .. } => field.clone(),
        }
    }
}

impl From<UnknownVariant> for ValidationError {
    fn from(err: UnknownVariant) -> Self {
        if err.kind == "action type" {
            Self::UnknownAction(UnknownActionError(err.value))
        } else {
            Self::UnknownTriggerType(err.value)
        }
    }
}

/// An action kind with no registered handler
#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown action type '{0}'")]
pub struct UnknownActionError(pub String);

/// A single action step failed; recorded in the execution log, never aborts the run
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{action} failed: {cause}")]
pub struct ActionExecutionError {
    pub action: ActionType,
    pub cause: String,
}

impl ActionExecutionError {
    pub fn new(action: ActionType, cause: impl Into<String>) -> Self {
        Self {
            action,
            cause: cause.into(),
        }
    }
}

/// The pipeline itself cannot proceed; the execution record is finalized as failed
#[derive(Error, Debug)]
pub enum WorkflowExecutionError {
    #[error("execution cap reached: {count} of {max} allowed executions already used")]
    CapReached { count: i64, max: i64 },
    #[error(transparent)]
    UnknownAction(#[from] UnknownActionError),
    #[error("internal fault: {0}")]
    Internal(String),
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("stored {entity} could not be decoded: {reason}")]
    Corrupt { entity: &'static str, reason: String },
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("Record".to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                Self::Conflict(db.message().to_string())
            }
            _ => Self::Database(err),
        }
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("dispatch queue is full ({capacity} events pending)")]
    QueueFull { capacity: usize },
    #[error("dispatch queue is closed")]
    Closed,
    #[error("failed to load workflows: {0}")]
    Lookup(#[from] RepositoryError),
}

/// Errors surfaced by the administrative workflow surface
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Execution(#[from] WorkflowExecutionError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for WorkflowError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => Self::NotFound(what),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
