// Trigger Dispatcher - matches active definitions to an event and runs each one

use automation_shared::{ExecutionRecord, ExecutionStatus, TriggerType, WorkflowDefinition};
use chrono::Utc;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::conditions;
use super::engine::ExecutionEngine;
use super::errors::DispatchError;
use super::repository::WorkflowRepository;
use super::triggers::{OwnerScope, TriggerEvent, matches_trigger_config};

pub struct TriggerDispatcher {
    repository: Arc<dyn WorkflowRepository>,
    engine: Arc<ExecutionEngine>,
}

impl TriggerDispatcher {
    pub fn new(repository: Arc<dyn WorkflowRepository>, engine: Arc<ExecutionEngine>) -> Self {
        Self { repository, engine }
    }

    /// Run every matching ACTIVE definition; one failing never stops the others
    pub async fn dispatch(
        &self,
        trigger_type: TriggerType,
        trigger_data: serde_json::Value,
        owner_scope: Option<OwnerScope>,
    ) -> Result<Vec<ExecutionRecord>, DispatchError> {
        let candidates = self
            .repository
            .find_active_by_trigger(trigger_type, owner_scope)
            .await?;

        let matching: Vec<WorkflowDefinition> = candidates
            .into_iter()
            .filter(|wf| wf.is_eligible())
            .filter(|wf| matches_trigger_config(&wf.trigger_config, &trigger_data))
            .filter(|wf| conditions::evaluate_all(&wf.conditions, &trigger_data))
            .collect();

        debug!(trigger = %trigger_type, matched = matching.len(), "Dispatching trigger");

        let mut records = Vec::with_capacity(matching.len());
        for workflow in &matching {
            records.push(self.run_isolated(workflow, trigger_type, trigger_data.clone()).await);
        }

        Ok(records)
    }

    pub async fn dispatch_event(&self, event: TriggerEvent) -> Result<Vec<ExecutionRecord>, DispatchError> {
        self.dispatch(event.trigger_type, event.trigger_data, event.owner_scope)
            .await
    }

    /// Always yields a record, even when persistence fails
    pub async fn run_isolated(
        &self,
        workflow: &WorkflowDefinition,
        trigger_type: TriggerType,
        trigger_data: serde_json::Value,
    ) -> ExecutionRecord {
        match self.engine.run(workflow, trigger_type, trigger_data.clone()).await {
            Ok(record) => record,
            Err(err) => {
                error!(workflow_id = %workflow.id, "Workflow execution could not be recorded: {}", err);
                let mut record = ExecutionRecord::start(workflow, trigger_type, trigger_data);
                let now = Utc::now();
                record.status = ExecutionStatus::Failed;
                record.error_message = Some(err.to_string());
                record.completed_at = Some(now);
                record.duration_ms = Some(0);
                record
            }
        }
    }
}

/// Bounded fire-and-forget front of the dispatcher
pub struct DispatchQueue {
    // the only sender; taking it closes the channel
    intake: SyncMutex<Option<mpsc::Sender<TriggerEvent>>>,
    capacity: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchQueue {
    pub fn start(dispatcher: Arc<TriggerDispatcher>, workers: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel::<TriggerEvent>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    loop {
                        // None only once intake is closed and the channel is drained
                        let next = receiver.lock().await.recv().await;
                        let Some(event) = next else {
                            break;
                        };

                        let event_id = event.event_id;
                        match dispatcher.dispatch_event(event).await {
                            Ok(records) => debug!(worker_id, %event_id, executions = records.len(), "Event dispatched"),
                            Err(e) => error!(worker_id, %event_id, "Event dispatch failed: {}", e),
                        }
                    }
                    debug!(worker_id, "Dispatch worker stopped");
                })
            })
            .collect();

        info!(workers = workers.max(1), capacity, "Dispatch queue started");

        Self {
            intake: SyncMutex::new(Some(sender)),
            capacity,
            workers: Mutex::new(handles),
        }
    }

    /// Queue an event without waiting for any workflow to run
    pub fn enqueue(&self, event: TriggerEvent) -> Result<(), DispatchError> {
        let intake = self.intake.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = intake.as_ref().ok_or(DispatchError::Closed)?;
        sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(event) => {
                warn!(event_id = %event.event_id, trigger = %event.trigger_type, "Dispatch queue full, event rejected");
                DispatchError::QueueFull { capacity: self.capacity }
            }
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }

    /// Stop accepting events and wait for workers to drain what is queued
    pub async fn shutdown(&self) {
        drop(self.intake.lock().unwrap_or_else(PoisonError::into_inner).take());
        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Dispatch worker panicked: {}", e);
            }
        }
        info!("Dispatch queue stopped");
    }
}
