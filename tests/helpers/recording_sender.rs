//! Email and webhook senders that record what they were asked to deliver.

use async_trait::async_trait;
use domainwatch::core::{AlertNotice, EmailMessage, EmailSender, WebhookSender};
use domainwatch::notification::NotifyError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following send fail.
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Email("relay rejected the message".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingWebhookSender {
    sent: Mutex<Vec<(String, AlertNotice)>>,
    fail: AtomicBool,
}

impl RecordingWebhookSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following send fail.
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, AlertNotice)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for RecordingWebhookSender {
    async fn send(&self, url: &str, notice: &AlertNotice) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Http {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((url.to_string(), notice.clone()));
        Ok(())
    }
}
