//! Webhook delivery to Slack, Discord and generic JSON endpoints.

use super::NotifyError;
use crate::core::{AlertNotice, WebhookSender};
use crate::formatting::{format_expiry_date, remaining_phrase};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, instrument};

/// Longest response body excerpt kept in an error.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// The payload family a webhook URL expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookTarget {
    Slack,
    Discord,
    Generic,
}

impl WebhookTarget {
    /// Picks the payload family from the URL host. Anything unrecognized,
    /// including URLs that do not parse, gets the generic payload.
    pub fn from_url(url: &str) -> Self {
        let Ok(parsed) = Url::parse(url) else {
            return WebhookTarget::Generic;
        };
        match parsed.host_str() {
            Some("hooks.slack.com") => WebhookTarget::Slack,
            Some("discord.com" | "discordapp.com" | "ptb.discord.com" | "canary.discord.com")
                if parsed.path().starts_with("/api/webhooks") =>
            {
                WebhookTarget::Discord
            }
            _ => WebhookTarget::Generic,
        }
    }

    pub fn payload(&self, notice: &AlertNotice) -> Value {
        match self {
            WebhookTarget::Slack => slack_payload(notice),
            WebhookTarget::Discord => discord_payload(notice),
            WebhookTarget::Generic => generic_payload(notice),
        }
    }
}

fn headline(notice: &AlertNotice) -> String {
    format!(
        "domainwatch alert: {} of {} ({})",
        notice.kind.facet(),
        notice.domain_name,
        remaining_phrase(notice.days_remaining)
    )
}

fn slack_payload(notice: &AlertNotice) -> Value {
    let color = if notice.days_remaining < 7 {
        "#e11d48"
    } else {
        "#f59e0b"
    };
    let status = match notice.days_remaining {
        d if d < 0 => ":red_circle: Expired".to_string(),
        d if d < 7 => format!(":red_circle: {}", remaining_phrase(d)),
        d => format!(":large_orange_circle: {}", remaining_phrase(d)),
    };
    let details = [
        "*:warning: domainwatch alert*".to_string(),
        String::new(),
        format!("*Domain:* {}", notice.domain_name),
        format!("*Type:* {}", notice.kind.label()),
        format!("*Expiry:* {}", format_expiry_date(notice.expiry)),
        format!("*Status:* {}", status),
    ]
    .join("\n");

    json!({
        "text": headline(notice),
        "attachments": [{
            "color": color,
            "blocks": [
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": details }
                },
                {
                    "type": "actions",
                    "elements": [{
                        "type": "button",
                        "text": { "type": "plain_text", "text": "Open dashboard" },
                        "url": notice.dashboard_url
                    }]
                }
            ]
        }]
    })
}

fn discord_payload(notice: &AlertNotice) -> Value {
    let content = [
        "**domainwatch alert**".to_string(),
        format!("Domain: **{}**", notice.domain_name),
        format!("Type: {}", notice.kind.label()),
        format!("Expiry: {}", format_expiry_date(notice.expiry)),
        format!("Status: {}", remaining_phrase(notice.days_remaining)),
        format!("Dashboard: {}", notice.dashboard_url),
    ]
    .join("\n");
    json!({ "content": content })
}

fn generic_payload(notice: &AlertNotice) -> Value {
    json!({
        "text": headline(notice),
        "domain": notice.domain_name,
        "kind": notice.kind,
        "expiry_date": notice.expiry.to_rfc3339(),
        "days_remaining": notice.days_remaining,
        "dashboard_url": notice.dashboard_url,
    })
}

/// Posts alert payloads over HTTP.
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    #[instrument(skip(self, notice), fields(domain = %notice.domain_name, kind = %notice.kind))]
    async fn send(&self, url: &str, notice: &AlertNotice) -> Result<(), NotifyError> {
        let url = Url::parse(url).map_err(|e| NotifyError::InvalidUrl(e.to_string()))?;
        let target = WebhookTarget::from_url(url.as_str());
        let payload = target.payload(notice);

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request to webhook failed");
                NotifyError::Request(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            info!(?target, "Webhook delivered");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let body: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        error!(status = %status, body = %body, "Webhook rejected the notification");
        Err(NotifyError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AlertKind;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notice(days: i64) -> AlertNotice {
        AlertNotice {
            domain_name: "example.com".to_string(),
            kind: AlertKind::CertExpiry,
            days_remaining: days,
            expiry: Utc.with_ymd_and_hms(2030, 8, 13, 4, 0, 0).unwrap(),
            dashboard_url: "https://app.example.net/dashboard".to_string(),
        }
    }

    #[test]
    fn test_target_from_url() {
        assert_eq!(
            WebhookTarget::from_url("https://hooks.slack.com/services/T0/B0/X"),
            WebhookTarget::Slack
        );
        assert_eq!(
            WebhookTarget::from_url("https://discord.com/api/webhooks/1/abc"),
            WebhookTarget::Discord
        );
        assert_eq!(
            WebhookTarget::from_url("https://discordapp.com/api/webhooks/1/abc"),
            WebhookTarget::Discord
        );
        assert_eq!(
            WebhookTarget::from_url("https://discord.com/channels/1"),
            WebhookTarget::Generic
        );
        // Host matching, not substring matching.
        assert_eq!(
            WebhookTarget::from_url("https://evil.example/hooks.slack.com"),
            WebhookTarget::Generic
        );
        assert_eq!(WebhookTarget::from_url("not a url"), WebhookTarget::Generic);
    }

    #[test]
    fn test_slack_payload_color_follows_days() {
        let red = WebhookTarget::Slack.payload(&notice(5));
        assert_eq!(red["attachments"][0]["color"], "#e11d48");
        let orange = WebhookTarget::Slack.payload(&notice(10));
        assert_eq!(orange["attachments"][0]["color"], "#f59e0b");
        assert_eq!(
            orange["attachments"][0]["blocks"][1]["elements"][0]["url"],
            "https://app.example.net/dashboard"
        );
    }

    #[test]
    fn test_discord_payload_is_markdown_content() {
        let payload = WebhookTarget::Discord.payload(&notice(-2));
        let content = payload["content"].as_str().unwrap();
        assert!(content.contains("**example.com**"));
        assert!(content.contains("Status: Expired"));
    }

    #[test]
    fn test_generic_payload_fields() {
        let payload = WebhookTarget::Generic.payload(&notice(5));
        assert_eq!(payload["domain"], "example.com");
        assert_eq!(payload["kind"], "cert_expiry");
        assert_eq!(payload["days_remaining"], 5);
        assert_eq!(payload["expiry_date"], "2030-08-13T04:00:00+00:00");
        assert!(payload["text"].as_str().unwrap().contains("5 days left"));
    }

    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({ "domain": "example.com" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sender = HttpWebhookSender::new(Duration::from_secs(5)).unwrap();
        let result = sender
            .send(&format!("{}/hook", server.uri()), &notice(5))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_non_2xx_reports_status_and_truncated_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(500)))
            .mount(&server)
            .await;

        let sender = HttpWebhookSender::new(Duration::from_secs(5)).unwrap();
        let err = sender
            .send(&format!("{}/hook", server.uri()), &notice(5))
            .await
            .unwrap_err();
        match err {
            NotifyError::Http { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), 200);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let sender = HttpWebhookSender::new(Duration::from_millis(300)).unwrap();
        let err = sender.send(&server.uri(), &notice(5)).await.unwrap_err();
        assert!(matches!(err, NotifyError::Request(_)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let sender = HttpWebhookSender::new(Duration::from_secs(1)).unwrap();
        let err = sender.send("::not-a-url", &notice(5)).await.unwrap_err();
        assert!(matches!(err, NotifyError::InvalidUrl(_)));
    }
}
