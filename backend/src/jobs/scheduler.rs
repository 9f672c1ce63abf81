// Workflow Scheduler - fixed-interval background loop for scheduled workflows

use automation_shared::{TriggerType, WorkflowDefinition};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::workflows::triggers::MAX_INTERVAL_MINUTES;
use crate::workflows::{RepositoryError, TriggerDispatcher, TriggerEvent, WorkflowRepository};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler error: {0}")]
    Job(#[from] JobSchedulerError),
    #[error("Scheduler is already running")]
    AlreadyRunning,
}

#[derive(Error, Debug)]
pub enum SchedulerTickError {
    #[error("failed to load scheduled workflows: {0}")]
    Lookup(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    /// Used when a definition has no `interval_minutes` of its own
    pub default_interval_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            default_interval_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub considered: usize,
    pub dispatched: usize,
    pub not_due: usize,
    pub in_flight: usize,
    pub capped: usize,
    pub failed: usize,
}

/// Per-definition interval from `trigger_config.interval_minutes`
pub fn interval_minutes(workflow: &WorkflowDefinition, default_minutes: i64) -> i64 {
    workflow
        .trigger_config
        .get("interval_minutes")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .filter(|m| (1..=MAX_INTERVAL_MINUTES).contains(m))
        .unwrap_or(default_minutes)
}

/// Never run, or the interval has fully elapsed since the last run.
/// An interval too large to represent is never due.
pub fn is_due(workflow: &WorkflowDefinition, now: DateTime<Utc>, default_minutes: i64) -> bool {
    match workflow.last_executed_at {
        None => true,
        Some(last) => ChronoDuration::try_minutes(interval_minutes(workflow, default_minutes))
            .is_some_and(|interval| now.signed_duration_since(last) > interval),
    }
}

struct InFlight {
    ids: Arc<StdMutex<HashSet<Uuid>>>,
    id: Uuid,
}

impl InFlight {
    fn claim(ids: &Arc<StdMutex<HashSet<Uuid>>>, id: Uuid) -> Option<Self> {
        let mut set = ids.lock().unwrap_or_else(|p| p.into_inner());
        set.insert(id).then(|| Self { ids: ids.clone(), id })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut set = self.ids.lock().unwrap_or_else(|p| p.into_inner());
        set.remove(&self.id);
    }
}

struct Ticker {
    repository: Arc<dyn WorkflowRepository>,
    dispatcher: Arc<TriggerDispatcher>,
    default_interval_minutes: i64,
    in_flight: Arc<StdMutex<HashSet<Uuid>>>,
}

impl Ticker {
    async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, SchedulerTickError> {
        let workflows = self
            .repository
            .find_active_by_trigger(TriggerType::Scheduled, None)
            .await?;

        let mut summary = TickSummary {
            considered: workflows.len(),
            ..TickSummary::default()
        };

        for workflow in workflows.iter().filter(|wf| wf.is_eligible()) {
            if !is_due(workflow, now, self.default_interval_minutes) {
                summary.not_due += 1;
                continue;
            }
            if workflow.cap_reached() {
                debug!(workflow_id = %workflow.id, "Scheduled workflow has reached its execution cap");
                summary.capped += 1;
                continue;
            }
            let Some(_guard) = InFlight::claim(&self.in_flight, workflow.id) else {
                debug!(workflow_id = %workflow.id, "Previous scheduled run still in progress, skipping");
                summary.in_flight += 1;
                continue;
            };

            let interval = interval_minutes(workflow, self.default_interval_minutes);
            let event = TriggerEvent::scheduled(workflow.id, now, interval);
            let record = self
                .dispatcher
                .run_isolated(workflow, TriggerType::Scheduled, event.trigger_data)
                .await;

            summary.dispatched += 1;
            if record.status == automation_shared::ExecutionStatus::Failed {
                summary.failed += 1;
            }
        }

        Ok(summary)
    }
}

/// Owns the background loop; constructed once at startup and stopped on shutdown
pub struct WorkflowScheduler {
    ticker: Arc<Ticker>,
    poll_interval: Duration,
    inner: RwLock<Option<TokioScheduler>>,
}

impl WorkflowScheduler {
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        dispatcher: Arc<TriggerDispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            ticker: Arc::new(Ticker {
                repository,
                dispatcher,
                default_interval_minutes: config.default_interval_minutes.max(1),
                in_flight: Arc::new(StdMutex::new(HashSet::new())),
            }),
            poll_interval: config.poll_interval,
            inner: RwLock::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// One poll: run every ACTIVE scheduled definition that is due at `now`
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, SchedulerTickError> {
        self.ticker.tick(now).await
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().await;
        if inner.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let scheduler = TokioScheduler::new().await?;
        let ticker = self.ticker.clone();

        let job = Job::new_repeated_async(self.poll_interval, move |_uuid, _lock| {
            let ticker = ticker.clone();
            Box::pin(async move {
                match ticker.tick(Utc::now()).await {
                    Ok(summary) if summary.dispatched > 0 => {
                        info!(
                            dispatched = summary.dispatched,
                            failed = summary.failed,
                            "Scheduled workflows dispatched"
                        );
                    }
                    Ok(summary) => debug!(considered = summary.considered, "Scheduler tick found nothing due"),
                    Err(e) => error!("Scheduler tick failed: {}", e),
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;
        *inner = Some(scheduler);

        info!(poll_secs = self.poll_interval.as_secs(), "Workflow scheduler started");
        Ok(())
    }

    /// Stop polling; runs already in progress finish on their own
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().await;
        match inner.take() {
            Some(mut scheduler) => {
                scheduler.shutdown().await?;
                info!("Workflow scheduler stopped");
            }
            None => warn!("Workflow scheduler stop requested while not running"),
        }
        Ok(())
    }
}
