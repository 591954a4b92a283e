//! Delivery of expiry alerts over email and webhooks.
//!
//! The `Dispatcher` attempts every configured channel for an alert
//! independently and reports per-channel outcomes. Senders live behind the
//! `EmailSender` and `WebhookSender` traits so the batch orchestrator can be
//! tested without a mail relay or an HTTP endpoint.
pub mod dispatcher;
pub mod email;
pub mod webhook;

use thiserror::Error;

pub use dispatcher::{ChannelResult, DispatchOutcome, Dispatcher};
pub use email::{LogEmailSender, SmtpEmailSender};
pub use webhook::{HttpWebhookSender, WebhookTarget};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    /// The endpoint answered with a non-2xx status. `body` holds at most the
    /// first 200 characters of the response.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("webhook request failed: {0}")]
    Request(String),

    #[error("invalid webhook URL: {0}")]
    InvalidUrl(String),

    #[error("email delivery failed: {0}")]
    Email(String),

    #[error("no email address on file")]
    NoRecipient,
}
