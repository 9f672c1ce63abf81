// Production providers behind the workflow action seams

pub mod email;
pub mod entities;
pub mod notifications;
pub mod webhooks;

pub use email::EmailService;
pub use entities::PgEntityMutator;
pub use notifications::PgNotificationSender;
pub use webhooks::HttpWebhookCaller;
