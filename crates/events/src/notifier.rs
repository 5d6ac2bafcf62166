//! Email notification delivery via SMTP.
//!
//! [`EmailNotifier`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and mails the owning user about each terminal job outcome.
//! Configuration is loaded from environment variables; if `SMTP_HOST` is
//! not set, [`EmailConfig::from_env`] returns `None` and no notifier
//! should be constructed. Delivery failures are logged and swallowed --
//! notification is best-effort and never feeds back into job state.

use tokio::sync::broadcast;

use photoloom_db::repositories::UserRepo;
use photoloom_db::DbPool;

use crate::bus::JobEvent;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@photoloom.local";

/// Configuration for the SMTP email delivery service.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    /// Optional SMTP username.
    pub smtp_user: Option<String>,
    /// Optional SMTP password.
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that email
    /// delivery is not configured and should be skipped.
    ///
    /// | Variable        | Required | Default                    |
    /// |-----------------|----------|----------------------------|
    /// | `SMTP_HOST`     | yes      | --                          |
    /// | `SMTP_PORT`     | no       | `587`                      |
    /// | `SMTP_FROM`     | no       | `noreply@photoloom.local`  |
    /// | `SMTP_USER`     | no       | --                          |
    /// | `SMTP_PASSWORD` | no       | --                          |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// EmailDelivery
// ---------------------------------------------------------------------------

/// Sends one notification email per job outcome via SMTP.
pub struct EmailDelivery {
    config: EmailConfig,
}

impl EmailDelivery {
    /// Create a new email delivery service with the given configuration.
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send a notification email for the given event to the specified
    /// address.
    pub async fn deliver(&self, to_email: &str, event: &JobEvent) -> Result<(), EmailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let subject = format!("[Photoloom] {}", subject_line(event));
        let body = format!(
            "Event: {}\nTime: {}\nDetails: {}",
            event.event_type,
            event.timestamp,
            serde_json::to_string_pretty(&event.payload).unwrap_or_default()
        );

        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to_email.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = transport_builder.build();
        mailer.send(email).await?;

        tracing::info!(to = to_email, event_type = %event.event_type, "Notification email sent");
        Ok(())
    }
}

/// Human subject line for an outcome event.
fn subject_line(event: &JobEvent) -> String {
    let what = event.kind.as_deref().unwrap_or("job");
    match event.event_type.as_str() {
        "job.succeeded" => format!("Your {what} finished"),
        "job.failed" => format!("Your {what} did not finish"),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// EmailNotifier
// ---------------------------------------------------------------------------

/// Background subscriber mailing users about their finished jobs.
pub struct EmailNotifier;

impl EmailNotifier {
    /// Run the notification loop.
    ///
    /// Receives events from the bus, resolves the owning user's address,
    /// and delivers. The loop exits when the channel closes (i.e. the
    /// [`EventBus`](crate::bus::EventBus) is dropped). System-triggered
    /// sample batches are not announced.
    pub async fn run(
        pool: DbPool,
        mut receiver: broadcast::Receiver<JobEvent>,
        delivery: EmailDelivery,
    ) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if event.kind.as_deref() == Some("generate_sample") {
                        continue;
                    }
                    Self::notify(&pool, &delivery, &event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Email notifier lagged, some events were skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, email notifier shutting down");
                    break;
                }
            }
        }
    }

    /// Resolve the recipient and deliver a single event, logging any
    /// failure.
    async fn notify(pool: &DbPool, delivery: &EmailDelivery, event: &JobEvent) {
        let user = match UserRepo::find_by_id(pool, event.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(user_id = event.user_id, "Notification for unknown user");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, user_id = event.user_id, "User lookup failed");
                return;
            }
        };

        if let Err(e) = delivery.deliver(&user.email, event).await {
            tracing::error!(
                error = %e,
                user_id = event.user_id,
                event_type = %event.event_type,
                "Notification email failed",
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
