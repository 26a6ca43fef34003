//! Slack incoming-webhook sink

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

use super::{Alert, Notifier};
use crate::constants::{ALERT_PREVIEW_CHARS, HTTP_TIMEOUT_SECS};
use crate::mail::parser::truncate_chars;

pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            webhook_url: webhook_url.to_string(),
        }
    }

    async fn post(&self, payload: &Value) -> bool {
        match self.client.post(&self.webhook_url).json(payload).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::error!("Slack webhook rejected notification ({}): {}", status, body);
                false
            }
            Err(e) => {
                tracing::error!("Error sending Slack notification: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, alert: &Alert) -> bool {
        tracing::debug!(
            account = %alert.account_id,
            uid = alert.uid,
            "Sending Slack notification for {:?}",
            alert.subject
        );
        self.post(&alert_payload(alert)).await
    }

    async fn test_connection(&self) -> bool {
        let payload = json!({
            "text": "Test notification from mailsift. If you see this, Slack integration is working!"
        });
        self.post(&payload).await
    }
}

/// Block Kit message for one alert.
pub(super) fn alert_payload(alert: &Alert) -> Value {
    let subject = alert.subject.as_deref().unwrap_or("(No subject)");
    let from = alert.from.as_deref().unwrap_or("Unknown sender");
    let date = alert
        .date
        .clone()
        .unwrap_or_else(|| chrono::Local::now().to_rfc2822());

    json!({
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("New Interested Email: {}", subject),
                    "emoji": true
                }
            },
            {
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*From:*\n{}", from) },
                    { "type": "mrkdwn", "text": format!("*Date:*\n{}", date) }
                ]
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("*Preview:*\n{}", preview(&alert.text)) }
            },
            { "type": "divider" },
            {
                "type": "context",
                "elements": [
                    { "type": "mrkdwn", "text": format!("Classified as: *{}*", alert.category) }
                ]
            }
        ]
    })
}

fn preview(text: &str) -> String {
    let mut preview = truncate_chars(text, ALERT_PREVIEW_CHARS);
    if text.chars().count() > ALERT_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}
