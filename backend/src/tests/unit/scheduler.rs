// Scheduler ticks over the in-memory repository

use automation_shared::{ActionStep, ExecutionStatus, TriggerType, WorkflowStatus};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::jobs::{SchedulerConfig, SchedulerError, TickSummary, WorkflowScheduler};
use crate::tests::fixtures::WorkflowFixture;
use crate::tests::helpers::{InMemoryWorkflowRepository, RecordingProviders};
use crate::workflows::{ExecutionEngine, TriggerDispatcher, WorkflowRepository};

fn scheduler(repo: &Arc<InMemoryWorkflowRepository>) -> WorkflowScheduler {
    let repository: Arc<dyn WorkflowRepository> = repo.clone();
    let engine = Arc::new(ExecutionEngine::new(repository.clone(), RecordingProviders::new().registry()));
    let dispatcher = Arc::new(TriggerDispatcher::new(repository.clone(), engine));
    WorkflowScheduler::new(
        repository,
        dispatcher,
        SchedulerConfig {
            poll_interval: Duration::from_secs(1),
            default_interval_minutes: 60,
        },
    )
}

fn hourly() -> WorkflowFixture {
    WorkflowFixture::new(Uuid::new_v4(), TriggerType::Scheduled)
        .trigger_config(json!({ "interval_minutes": 60 }))
        .action(ActionStep::wait(1))
}

#[tokio::test]
async fn test_overdue_definition_is_dispatched() {
    let repo = InMemoryWorkflowRepository::new();
    let now = Utc::now();
    let workflow = hourly().last_executed_at(now - ChronoDuration::hours(2)).build();
    repo.insert_workflow(workflow.clone());

    let summary = scheduler(&repo).tick(now).await.unwrap();

    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.failed, 0);

    let records = repo.executions_for(workflow.id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExecutionStatus::Success);
    assert_eq!(records[0].trigger_type, TriggerType::Scheduled);
    assert_eq!(records[0].trigger_data["schedule"]["interval_minutes"], 60);

    let stored = repo.workflow(workflow.id);
    let last = stored.last_executed_at.unwrap();
    assert!(last >= now, "last_executed_at moved to the run time");
    assert_eq!(stored.execution_count, 1);
}

#[tokio::test]
async fn test_out_of_range_interval_does_not_break_the_tick() {
    let repo = InMemoryWorkflowRepository::new();
    let now = Utc::now();
    // stored before intervals were bounded; falls back to the default
    let huge = WorkflowFixture::new(Uuid::new_v4(), TriggerType::Scheduled)
        .trigger_config(json!({ "interval_minutes": i64::MAX }))
        .action(ActionStep::wait(1))
        .last_executed_at(now - ChronoDuration::hours(2))
        .build();
    let ordinary = hourly().last_executed_at(now - ChronoDuration::hours(2)).build();
    repo.insert_workflow(huge.clone());
    repo.insert_workflow(ordinary.clone());

    let summary = scheduler(&repo).tick(now).await.unwrap();

    assert_eq!(summary.considered, 2);
    assert_eq!(summary.dispatched, 2);
    assert_eq!(repo.executions_for(ordinary.id).len(), 1);
    assert_eq!(repo.executions_for(huge.id).len(), 1);
}

#[tokio::test]
async fn test_recent_definition_is_not_dispatched() {
    let repo = InMemoryWorkflowRepository::new();
    let now = Utc::now();
    let workflow = hourly().last_executed_at(now - ChronoDuration::minutes(10)).build();
    repo.insert_workflow(workflow.clone());

    let summary = scheduler(&repo).tick(now).await.unwrap();

    assert_eq!(
        summary,
        TickSummary {
            considered: 1,
            not_due: 1,
            ..TickSummary::default()
        }
    );
    assert!(repo.executions_for(workflow.id).is_empty());
}

#[tokio::test]
async fn test_never_run_paused_and_capped_definitions() {
    let repo = InMemoryWorkflowRepository::new();
    let now = Utc::now();
    let fresh = hourly().build();
    let paused = hourly().status(WorkflowStatus::Paused).build();
    let capped = hourly()
        .executions(3, Some(3))
        .last_executed_at(now - ChronoDuration::days(1))
        .build();
    for wf in [&fresh, &paused, &capped] {
        repo.insert_workflow(wf.clone());
    }

    let summary = scheduler(&repo).tick(now).await.unwrap();

    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.capped, 1);
    assert_eq!(repo.executions_for(fresh.id).len(), 1);
    assert!(repo.executions_for(paused.id).is_empty());
    assert!(repo.executions_for(capped.id).is_empty());
    assert_eq!(repo.workflow(capped.id).execution_count, 3);
}

#[tokio::test]
async fn test_second_tick_waits_for_the_interval() {
    let repo = InMemoryWorkflowRepository::new();
    let workflow = hourly().build();
    repo.insert_workflow(workflow.clone());
    let scheduler = scheduler(&repo);

    let now = Utc::now();
    assert_eq!(scheduler.tick(now).await.unwrap().dispatched, 1);
    assert_eq!(scheduler.tick(now + ChronoDuration::minutes(30)).await.unwrap().dispatched, 0);
    assert_eq!(scheduler.tick(now + ChronoDuration::minutes(61)).await.unwrap().dispatched, 1);
    assert_eq!(repo.executions_for(workflow.id).len(), 2);
}

#[tokio::test]
async fn test_start_and_stop() {
    let repo = InMemoryWorkflowRepository::new();
    let scheduler = scheduler(&repo);

    scheduler.start().await.unwrap();
    assert!(scheduler.is_running().await);
    assert!(matches!(scheduler.start().await, Err(SchedulerError::AlreadyRunning)));

    scheduler.stop().await.unwrap();
    assert!(!scheduler.is_running().await);
}
