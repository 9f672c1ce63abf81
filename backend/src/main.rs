use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod database;
mod error;
mod handlers;
mod jobs;
mod pagination;
mod services;
mod workflows;

pub use error::{ApiError, ApiResult, AppError};
pub use pagination::{PaginatedResponse, PaginationMeta, PaginationParams};

use jobs::{SchedulerConfig, WorkflowScheduler};
use services::{EmailService, HttpWebhookCaller, PgEntityMutator, PgNotificationSender};
use workflows::{ActionProviders, ActionRegistry, DispatchQueue, PgWorkflowRepository, WorkflowRepository, WorkflowService};


pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub workflows: Arc<WorkflowService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    if !config.smtp.is_configured() {
        tracing::warn!("SMTP credentials not configured; send_email actions will fail");
    }

    let providers = ActionProviders {
        email: Arc::new(EmailService::new(&config.smtp)?),
        notifications: Arc::new(PgNotificationSender::new(db_pool.clone())),
        entities: Arc::new(PgEntityMutator::new(db_pool.clone())),
        webhooks: Arc::new(HttpWebhookCaller::new(config.workflow.webhook_timeout())?),
    };
    let registry = Arc::new(ActionRegistry::with_defaults(providers));
    let repository: Arc<dyn WorkflowRepository> = Arc::new(PgWorkflowRepository::new(db_pool.clone()));

    let service = WorkflowService::new(repository.clone(), registry);
    let queue = Arc::new(DispatchQueue::start(
        service.dispatcher(),
        config.workflow.dispatch_workers,
        config.workflow.dispatch_queue_capacity,
    ));
    let workflows = Arc::new(service.with_queue(queue.clone()));

    let scheduler = WorkflowScheduler::new(
        repository,
        workflows.dispatcher(),
        SchedulerConfig {
            poll_interval: config.workflow.poll_interval(),
            default_interval_minutes: config.workflow.default_schedule_minutes,
        },
    );
    if config.workflow.scheduler_enabled {
        scheduler.start().await?;
    } else {
        tracing::info!("Workflow scheduler disabled");
    }

    let app_state = Arc::new(AppState { db_pool, workflows });
    let app = handlers::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if scheduler.is_running().await {
        if let Err(e) = scheduler.stop().await {
            tracing::error!("Failed to stop workflow scheduler: {}", e);
        }
    }
    queue.shutdown().await;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
