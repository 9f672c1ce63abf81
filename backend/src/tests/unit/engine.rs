// Execution engine scenarios against the in-memory repository

use automation_shared::{ActionStep, ActionType, ExecutionStatus, StepStatus, TriggerType};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::tests::fixtures::{contact_created, WorkflowFixture};
use crate::tests::helpers::{
    init_test_logging, EntityCall, GatedAction, InMemoryWorkflowRepository, PanickingAction, RecordingProviders,
};
use crate::workflows::{ActionRegistry, ExecutionEngine, WorkflowRepository};

fn engine(repo: &Arc<InMemoryWorkflowRepository>, registry: Arc<ActionRegistry>) -> ExecutionEngine {
    let repository: Arc<dyn WorkflowRepository> = repo.clone();
    ExecutionEngine::new(repository, registry)
}

#[tokio::test]
async fn test_resolved_email_step_succeeds() {
    init_test_logging();
    let repo = InMemoryWorkflowRepository::new();
    let providers = RecordingProviders::new();
    let workflow = WorkflowFixture::new(Uuid::new_v4(), TriggerType::EntityCreated)
        .action(ActionStep::send_email("{{contact.email}}", "Welcome to {{workflow.name}}", "Hello"))
        .build();
    repo.insert_workflow(workflow.clone());

    let record = engine(&repo, providers.registry())
        .run(&workflow, TriggerType::EntityCreated, json!({ "contact": { "email": "a@b.com" } }))
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Success);
    assert_eq!(record.action_log.len(), 1);
    assert_eq!(record.action_log[0].config["to"], "a@b.com");
    assert_eq!(record.action_log[0].status, StepStatus::Success);
    assert_eq!((record.success_count, record.failure_count), (1, 0));
    assert!(record.completed_at.is_some());

    let sent = providers.emails();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@b.com");
    assert_eq!(sent[0].subject, format!("Welcome to {}", workflow.name));

    let stored = repo.workflow(workflow.id);
    assert_eq!(stored.execution_count, 1);
    assert_eq!(stored.last_executed_at, record.completed_at);
    assert_eq!(repo.executions_for(workflow.id)[0].status, ExecutionStatus::Success);
}

#[tokio::test]
async fn test_failed_step_yields_partial_record() {
    let repo = InMemoryWorkflowRepository::new();
    let providers = RecordingProviders::failing_email();
    let workflow = WorkflowFixture::new(Uuid::new_v4(), TriggerType::EntityCreated)
        .action(ActionStep::send_email("{{contact.email}}", "Hi", "Body"))
        .build();
    repo.insert_workflow(workflow.clone());

    let record = engine(&repo, providers.registry())
        .run(&workflow, TriggerType::EntityCreated, contact_created("a@b.com"))
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Partial);
    assert_eq!((record.success_count, record.failure_count), (0, 1));
    let entry = &record.action_log[0];
    assert_eq!(entry.status, StepStatus::Failed);
    let error = entry.error.as_deref().unwrap();
    assert!(error.contains("send_email"));
    assert!(error.contains("smtp connection refused"));

    // partial runs still count against the cap
    assert_eq!(repo.workflow(workflow.id).execution_count, 1);
}

#[tokio::test]
async fn test_later_steps_run_after_a_failure() {
    let repo = InMemoryWorkflowRepository::new();
    let providers = RecordingProviders::failing_email();
    let workflow = WorkflowFixture::new(Uuid::new_v4(), TriggerType::EntityCreated)
        .action(ActionStep::send_email("{{contact.email}}", "Hi", "Body"))
        .action(ActionStep::add_tag("contact", "{{contact.id}}", "welcomed"))
        .action(ActionStep::create_task("Call {{contact.first_name}}", Some(24), None))
        .build();
    repo.insert_workflow(workflow.clone());

    let data = contact_created("a@b.com");
    let record = engine(&repo, providers.registry())
        .run(&workflow, TriggerType::EntityCreated, data.clone())
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Partial);
    assert_eq!(record.attempted(), 3);
    assert_eq!((record.success_count, record.failure_count), (2, 1));
    assert_eq!(
        record.action_log.iter().map(|e| e.step).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    let calls = providers.entity_calls();
    assert_eq!(
        calls[0],
        EntityCall::Tag {
            kind: "contact".to_string(),
            id: data["contact"]["id"].as_str().unwrap().to_string(),
            tag: "welcomed".to_string(),
        }
    );
    match &calls[1] {
        EntityCall::Create { kind, attributes, .. } => {
            assert_eq!(kind, "task");
            assert_eq!(attributes["title"], "Call Ada");
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_out_of_range_value_is_a_contained_step_failure() {
    let repo = InMemoryWorkflowRepository::new();
    let providers = RecordingProviders::new();
    let workflow = WorkflowFixture::new(Uuid::new_v4(), TriggerType::EntityCreated)
        .action(ActionStep::new(
            ActionType::CreateTask,
            json!({ "title": "Follow up", "due_in_hours": "{{task.hours}}" }),
        ))
        .action(ActionStep::wait(5))
        .build();
    let registry = providers.registry();
    registry.validate_steps(&workflow.actions).unwrap();
    repo.insert_workflow(workflow.clone());

    let record = engine(&repo, registry)
        .run(
            &workflow,
            TriggerType::EntityCreated,
            json!({ "task": { "hours": i64::MAX / 2 } }),
        )
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Partial);
    assert!(record.error_message.is_none());
    assert_eq!((record.success_count, record.failure_count), (1, 1));
    assert_eq!(record.action_log[0].status, StepStatus::Failed);
    assert!(record.action_log[0].error.as_deref().unwrap().contains("due_in_hours"));
    assert_eq!(record.action_log[1].status, StepStatus::Success);
    assert!(providers.entity_calls().is_empty());
    assert_eq!(repo.workflow(workflow.id).execution_count, 1);
}

#[tokio::test]
async fn test_capped_workflow_fails_without_running() {
    let repo = InMemoryWorkflowRepository::new();
    let providers = RecordingProviders::new();
    let workflow = WorkflowFixture::new(Uuid::new_v4(), TriggerType::EntityCreated)
        .action(ActionStep::send_email("{{contact.email}}", "Hi", "Body"))
        .executions(1, Some(1))
        .build();
    repo.insert_workflow(workflow.clone());

    let record = engine(&repo, providers.registry())
        .run(&workflow, TriggerType::EntityCreated, contact_created("a@b.com"))
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(record.action_log.is_empty());
    assert!(record.error_message.as_deref().unwrap().contains("execution cap"));
    assert!(providers.emails().is_empty());

    let stored = repo.workflow(workflow.id);
    assert_eq!(stored.execution_count, 1);
    assert!(stored.last_executed_at.is_none());
    assert_eq!(repo.executions_for(workflow.id).len(), 1);
}

#[tokio::test]
async fn test_overlapping_runs_respect_the_cap() {
    let repo = InMemoryWorkflowRepository::new();
    let providers = RecordingProviders::new();
    let gate = GatedAction::new();
    let (started, release) = (gate.started.clone(), gate.release.clone());
    let mut registry = ActionRegistry::with_defaults(providers.action_providers());
    registry.register(Arc::new(gate));
    let engine = Arc::new(engine(&repo, Arc::new(registry)));

    let workflow = WorkflowFixture::new(Uuid::new_v4(), TriggerType::Manual)
        .action(ActionStep::wait(1))
        .executions(0, Some(1))
        .build();
    repo.insert_workflow(workflow.clone());

    let first = tokio::spawn({
        let engine = engine.clone();
        let workflow = workflow.clone();
        async move { engine.run(&workflow, TriggerType::Manual, json!({})).await }
    });
    started.notified().await;

    // the first run holds the only slot while it is parked on the gate
    let second = engine.run(&workflow, TriggerType::Manual, json!({})).await.unwrap();
    assert_eq!(second.status, ExecutionStatus::Failed);
    assert!(second.action_log.is_empty());
    assert!(second.error_message.as_deref().unwrap().contains("1 of 1"));

    release.add_permits(1);
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status, ExecutionStatus::Success);

    let stored = repo.workflow(workflow.id);
    assert_eq!(stored.execution_count, 1);
    assert_eq!(stored.last_executed_at, first.completed_at);
    assert_eq!(repo.executions_for(workflow.id).len(), 2);
}

#[tokio::test]
async fn test_aborted_run_frees_its_slot() {
    let repo = InMemoryWorkflowRepository::new();
    let providers = RecordingProviders::new();
    let mut registry = ActionRegistry::with_defaults(providers.action_providers());
    registry.register(Arc::new(PanickingAction));
    let engine = engine(&repo, Arc::new(registry));

    let workflow = WorkflowFixture::new(Uuid::new_v4(), TriggerType::Manual)
        .action(ActionStep::wait(1))
        .executions(0, Some(1))
        .build();
    repo.insert_workflow(workflow.clone());

    let aborted = engine.run(&workflow, TriggerType::Manual, json!({})).await.unwrap();
    assert_eq!(aborted.status, ExecutionStatus::Failed);
    assert_eq!(repo.workflow(workflow.id).execution_count, 0);

    // a second attempt still gets past the cap check and reaches the handler
    let retried = engine.run(&workflow, TriggerType::Manual, json!({})).await.unwrap();
    assert!(retried.error_message.as_deref().unwrap().contains("handler blew up"));
    assert_eq!(retried.action_log.len(), 0);
    assert_eq!(repo.workflow(workflow.id).execution_count, 0);
}

#[tokio::test]
async fn test_panicking_handler_aborts_as_failed() {
    let repo = InMemoryWorkflowRepository::new();
    let providers = RecordingProviders::new();
    let mut registry = ActionRegistry::with_defaults(providers.action_providers());
    registry.register(Arc::new(PanickingAction));

    let workflow = WorkflowFixture::new(Uuid::new_v4(), TriggerType::Manual)
        .action(ActionStep::send_email("a@b.com", "Hi", "Body"))
        .action(ActionStep::wait(30))
        .action(ActionStep::send_email("c@d.com", "Hi", "Body"))
        .build();
    repo.insert_workflow(workflow.clone());

    let record = engine(&repo, Arc::new(registry))
        .run(&workflow, TriggerType::Manual, json!({}))
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(record.error_message.as_deref().unwrap().contains("handler blew up"));
    assert_eq!(record.action_log.len(), 1);
    assert_eq!(providers.emails().len(), 1);

    // the stored row is finalized and the counter untouched
    assert_eq!(repo.executions_for(workflow.id)[0].status, ExecutionStatus::Failed);
    assert_eq!(repo.workflow(workflow.id).execution_count, 0);
}

#[tokio::test]
async fn test_unregistered_action_fails_the_run() {
    let repo = InMemoryWorkflowRepository::new();
    let workflow = WorkflowFixture::new(Uuid::new_v4(), TriggerType::Manual)
        .action(ActionStep::wait(5))
        .build();
    repo.insert_workflow(workflow.clone());

    let record = engine(&repo, Arc::new(ActionRegistry::new()))
        .run(&workflow, TriggerType::Manual, json!({}))
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(record.error_message.as_deref().unwrap().contains("unknown action type 'wait'"));
    assert!(record.action_log.is_empty());
}

#[tokio::test]
async fn test_unresolved_placeholders_are_kept_verbatim() {
    let repo = InMemoryWorkflowRepository::new();
    let providers = RecordingProviders::new();
    let workflow = WorkflowFixture::new(Uuid::new_v4(), TriggerType::FormSubmitted)
        .action(ActionStep::send_notification(
            "{{owner_id}}",
            "Form from {{fields.company}} by {{fields.missing}}",
            "warning",
        ))
        .build();
    repo.insert_workflow(workflow.clone());

    let record = engine(&repo, providers.registry())
        .run(
            &workflow,
            TriggerType::FormSubmitted,
            json!({ "owner_id": "u-1", "fields": { "company": "Initech" } }),
        )
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Success);
    let (recipient, message, _) = &providers.notifications()[0];
    assert_eq!(recipient, "u-1");
    assert_eq!(message, "Form from Initech by {{fields.missing}}");
}

#[tokio::test]
async fn test_persistence_failure_is_returned() {
    let repo = InMemoryWorkflowRepository::new();
    let workflow = WorkflowFixture::new(Uuid::new_v4(), TriggerType::Manual)
        .action(ActionStep::wait(1))
        .build();
    repo.insert_workflow(workflow.clone());
    repo.break_execution_writes(workflow.id);

    let result = engine(&repo, RecordingProviders::new().registry())
        .run(&workflow, TriggerType::Manual, json!({}))
        .await;

    assert!(result.is_err());
    assert_eq!(repo.workflow(workflow.id).execution_count, 0);
}
