//! Fans a single alert out to every channel configured for its account.

use super::NotifyError;
use crate::core::{AccountContact, AlertKind, AlertNotice, EmailSender, WebhookSender};
use crate::formatting::alert_email;
use chrono::{Duration, Utc};
use reqwest::Url;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Outcome of one channel attempt.
pub type ChannelResult = Result<(), NotifyError>;

/// Per-channel outcomes of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub email: ChannelResult,
    /// `None` when the account has no active webhook.
    pub webhook: Option<ChannelResult>,
}

impl DispatchOutcome {
    /// True when at least one channel delivered the alert.
    pub fn any_succeeded(&self) -> bool {
        self.email.is_ok() || matches!(self.webhook, Some(Ok(())))
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    email: Arc<dyn EmailSender>,
    webhook: Arc<dyn WebhookSender>,
    dashboard_url: String,
}

impl Dispatcher {
    pub fn new(
        email: Arc<dyn EmailSender>,
        webhook: Arc<dyn WebhookSender>,
        dashboard_url: String,
    ) -> Self {
        Self {
            email,
            webhook,
            dashboard_url,
        }
    }

    pub fn dashboard_url(&self) -> &str {
        &self.dashboard_url
    }

    /// Attempts email and webhook delivery. A failure on one channel never
    /// prevents the attempt on the other.
    #[instrument(skip(self, notice, contact), fields(domain = %notice.domain_name, kind = %notice.kind))]
    pub async fn dispatch(&self, notice: &AlertNotice, contact: &AccountContact) -> DispatchOutcome {
        let email = match &contact.email {
            Some(to) => {
                let result = self.email.send(&alert_email(to, notice)).await;
                if let Err(e) = &result {
                    warn!(sender = self.email.name(), error = %e, "Email channel failed");
                }
                result
            }
            None => Err(NotifyError::NoRecipient),
        };

        let webhook = match contact.webhook_url() {
            Some(url) => {
                let result = self.webhook.send(url, notice).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Webhook channel failed");
                }
                Some(result)
            }
            None => None,
        };

        record_channel("email", &email);
        if let Some(result) = &webhook {
            record_channel("webhook", result);
        }

        DispatchOutcome { email, webhook }
    }

    /// Sends a synthetic certificate alert for `example.com`, expiring in
    /// five days, to `url`. Nothing is recorded in the alert ledger.
    pub async fn send_test_webhook(&self, url: &str) -> ChannelResult {
        Url::parse(url).map_err(|e| NotifyError::InvalidUrl(e.to_string()))?;
        let notice = AlertNotice {
            domain_name: "example.com".to_string(),
            kind: AlertKind::CertExpiry,
            days_remaining: 5,
            expiry: Utc::now() + Duration::days(5),
            dashboard_url: self.dashboard_url.clone(),
        };
        self.webhook.send(url, &notice).await
    }
}

fn record_channel(channel: &'static str, result: &ChannelResult) {
    match result {
        Ok(()) => metrics::counter!("alerts_sent_total", "channel" => channel).increment(1),
        Err(_) => metrics::counter!("notification_failures_total", "channel" => channel).increment(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EmailMessage, NotificationPreference};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingEmail {
        fail: bool,
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailSender for RecordingEmail {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                Err(NotifyError::Email("relay refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingWebhook {
        fail: bool,
        sent: Mutex<Vec<(String, AlertNotice)>>,
    }

    #[async_trait]
    impl WebhookSender for RecordingWebhook {
        async fn send(&self, url: &str, notice: &AlertNotice) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push((url.to_string(), notice.clone()));
            if self.fail {
                Err(NotifyError::Http {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn notice() -> AlertNotice {
        AlertNotice {
            domain_name: "example.com".to_string(),
            kind: AlertKind::RegistrationExpiry,
            days_remaining: 25,
            expiry: Utc::now() + Duration::days(25),
            dashboard_url: "https://app.example.net/dashboard".to_string(),
        }
    }

    fn contact(webhook: Option<&str>, enabled: bool) -> AccountContact {
        AccountContact {
            email: Some("ops@example.com".to_string()),
            preference: Some(NotificationPreference {
                account_id: Uuid::new_v4(),
                webhook_url: webhook.map(str::to_string),
                enabled,
            }),
        }
    }

    fn dispatcher(email: Arc<RecordingEmail>, webhook: Arc<RecordingWebhook>) -> Dispatcher {
        Dispatcher::new(email, webhook, "https://app.example.net/dashboard".to_string())
    }

    #[tokio::test]
    async fn test_email_failure_does_not_block_webhook() {
        let email = Arc::new(RecordingEmail {
            fail: true,
            ..Default::default()
        });
        let webhook = Arc::new(RecordingWebhook::default());
        let outcome = dispatcher(email.clone(), webhook.clone())
            .dispatch(&notice(), &contact(Some("https://hooks.example/x"), true))
            .await;

        assert!(outcome.email.is_err());
        assert_eq!(outcome.webhook, Some(Ok(())));
        assert!(outcome.any_succeeded());
        assert_eq!(email.sent.lock().unwrap().len(), 1);
        assert_eq!(webhook.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_webhook_is_skipped() {
        let email = Arc::new(RecordingEmail::default());
        let webhook = Arc::new(RecordingWebhook::default());
        let outcome = dispatcher(email.clone(), webhook.clone())
            .dispatch(&notice(), &contact(Some("https://hooks.example/x"), false))
            .await;

        assert_eq!(outcome.email, Ok(()));
        assert_eq!(outcome.webhook, None);
        assert!(webhook.sent.lock().unwrap().is_empty());
        let sent = email.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "Domain of example.com expires in 25 days");
    }

    #[tokio::test]
    async fn test_all_channels_failing() {
        let email = Arc::new(RecordingEmail {
            fail: true,
            ..Default::default()
        });
        let webhook = Arc::new(RecordingWebhook {
            fail: true,
            ..Default::default()
        });
        let outcome = dispatcher(email, webhook)
            .dispatch(&notice(), &contact(Some("https://hooks.example/x"), true))
            .await;
        assert!(!outcome.any_succeeded());
    }

    #[tokio::test]
    async fn test_missing_email_address() {
        let email = Arc::new(RecordingEmail::default());
        let webhook = Arc::new(RecordingWebhook::default());
        let outcome = dispatcher(email.clone(), webhook)
            .dispatch(&notice(), &AccountContact::default())
            .await;
        assert_eq!(outcome.email, Err(NotifyError::NoRecipient));
        assert_eq!(outcome.webhook, None);
        assert!(email.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_test_webhook_uses_synthetic_notice() {
        let webhook = Arc::new(RecordingWebhook::default());
        let d = dispatcher(Arc::new(RecordingEmail::default()), webhook.clone());

        d.send_test_webhook("https://hooks.example/x").await.unwrap();
        let sent = webhook.sent.lock().unwrap();
        let (url, notice) = &sent[0];
        assert_eq!(url, "https://hooks.example/x");
        assert_eq!(notice.domain_name, "example.com");
        assert_eq!(notice.kind, AlertKind::CertExpiry);
        assert_eq!(notice.days_remaining, 5);
    }

    #[tokio::test]
    async fn test_test_webhook_rejects_invalid_url() {
        let webhook = Arc::new(RecordingWebhook::default());
        let d = dispatcher(Arc::new(RecordingEmail::default()), webhook.clone());
        let err = d.send_test_webhook("nope").await.unwrap_err();
        assert!(matches!(err, NotifyError::InvalidUrl(_)));
        assert!(webhook.sent.lock().unwrap().is_empty());
    }
}
