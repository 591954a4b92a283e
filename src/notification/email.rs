//! Email delivery over SMTP, or into the log when no relay is configured.

use super::NotifyError;
use crate::config::SmtpConfig;
use crate::core::{EmailMessage, EmailSender};
use anyhow::Result;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{info, instrument};

/// Sends emails through an SMTP relay.
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(from: &str, config: &SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .timeout(Some(Duration::from_millis(config.timeout_ms)));

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: from.parse()?,
        })
    }

    fn build_message(&self, message: &EmailMessage) -> Result<Message, NotifyError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| NotifyError::Email(format!("invalid recipient '{}': {}", message.to, e)))?;
        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject);

        let html = SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .body(message.html.clone());

        let built = match &message.attachment {
            None => builder.singlepart(html),
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| NotifyError::Email(e.to_string()))?;
                builder.multipart(
                    MultiPart::mixed().singlepart(html).singlepart(
                        MimeAttachment::new(attachment.filename.clone())
                            .body(attachment.data.clone(), content_type),
                    ),
                )
            }
        };
        built.map_err(|e| NotifyError::Email(e.to_string()))
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    fn name(&self) -> &str {
        "smtp"
    }

    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let email = self.build_message(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Email(e.to_string()))?;
        info!(subject = %message.subject, "Email sent");
        Ok(())
    }
}

/// Writes emails to the log instead of sending them.
///
/// Every send reports `NotifyError::Email`, so a logged message never counts
/// as a delivery and never lands in the alert ledger.
#[derive(Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            bytes = message.html.len(),
            attachment = message.attachment.as_ref().map(|a| a.filename.as_str()),
            "Email (not sent, no SMTP relay configured)"
        );
        Err(NotifyError::Email("no SMTP relay configured".to_string()))
    }
}
