use crate::config::SmtpConfig;
use crate::workflows::{EmailSender, ProviderError};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::{error, info};

/// SMTP delivery for the send_email action
#[derive(Debug, Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl EmailService {
    pub fn new(smtp_config: &SmtpConfig) -> Result<Self, lettre::transport::smtp::Error> {
        let creds = Credentials::new(
            smtp_config.username.clone(),
            smtp_config.password.clone(),
        );

        let builder = if smtp_config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
        };

        let transport = builder
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(EmailService {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }

    fn build_message(&self, to_email: &str, subject: &str, body: &str) -> Result<Message, ProviderError> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| ProviderError::Rejected(format!("invalid sender address: {}", e)))?;
        let to = to_email
            .trim()
            .parse::<Mailbox>()
            .map_err(|e| ProviderError::Rejected(format!("invalid recipient '{}': {}", to_email, e)))?;

        // Bodies that carry markup go out as HTML
        let content_type = if body.contains("</") || body.contains("<br") {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(content_type)
            .body(body.to_string())
            .map_err(|e| ProviderError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl EmailSender for EmailService {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ProviderError> {
        let message = self.build_message(to, subject, body)?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent successfully to {}", to);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", to, e);
                Err(ProviderError::Unavailable(e.to_string()))
            }
        }
    }
}
