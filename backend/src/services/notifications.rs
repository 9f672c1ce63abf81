// In-app notifications for the send_notification action

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::workflows::{NotificationSender, ProviderError, Severity};

const TITLE_LEN: usize = 80;

/// Writes into the host CRM's `notifications` table
#[derive(Debug, Clone)]
pub struct PgNotificationSender {
    db_pool: PgPool,
}

impl PgNotificationSender {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

fn title_from(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= TITLE_LEN {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(TITLE_LEN - 1).collect();
        format!("{}…", cut)
    }
}

#[async_trait]
impl NotificationSender for PgNotificationSender {
    async fn notify(&self, recipient: &str, message: &str, severity: Severity) -> Result<Uuid, ProviderError> {
        let user_id: Uuid = recipient
            .trim()
            .parse()
            .map_err(|_| ProviderError::Rejected(format!("recipient '{}' is not a user id", recipient)))?;

        let notification_id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO notifications (id, user_id, title, message, type, created_at)
             VALUES ($1, $2, $3, $4, $5, NOW())"
        )
        .bind(notification_id)
        .bind(user_id)
        .bind(title_from(message))
        .bind(message)
        .bind(severity.as_str())
        .execute(&self.db_pool)
        .await?;

        info!(%notification_id, %user_id, %severity, "Notification stored");
        Ok(notification_id)
    }
}
