// Background Jobs
//
// Jobs are scheduled using tokio-cron-scheduler and run independently of
// request handling.

pub mod scheduler;

pub use scheduler::{SchedulerConfig, SchedulerError, TickSummary, WorkflowScheduler};
