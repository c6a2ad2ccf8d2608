//! Submitter notifications.
//!
//! Delivery is best effort: the worker logs a failed send and carries on.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use util::config::AppConfig;

pub const SUCCESS_SUBJECT: &str = "Assignment Upload Successful";
pub const FAILURE_SUBJECT: &str = "Assignment Upload Failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn success(to: &str, file_name: &str, public_reference: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: SUCCESS_SUBJECT.to_string(),
            body: format!(
                "Your file {file_name} has been archived successfully.\n\n\
                 It is available at:\n\n    {public_reference}\n"
            ),
        }
    }

    pub fn failure(to: &str, reason: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: FAILURE_SUBJECT.to_string(),
            body: format!(
                "There was an error uploading your file.\n\n\
                 The error message is:\n\n    {reason}\n"
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build email: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.send(&notification.to, &notification.subject, &notification.body)
            .await
    }
}

/// Sends plain-text email through an SMTP relay using STARTTLS.
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn from_config(config: &AppConfig) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.sender_email.parse()?,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        self.transport.send(email).await?;
        Ok(())
    }
}
