//! Alerts for messages classified as Interested.
//!
//! Sinks implement [`Notifier`]; the [`Dispatcher`] hands each alert to a
//! spawned task so a slow webhook never holds up an account worker.

mod slack;

pub use slack::SlackNotifier;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::classify::Category;
use crate::mail::{MessageContent, MessageSummary};

/// What a sink receives about one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub account_id: String,
    pub uid: u32,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub date: Option<String>,
    pub text: String,
    pub category: Category,
}

impl Alert {
    pub fn from_summary(summary: &MessageSummary) -> Self {
        Self {
            account_id: summary.account_id.clone(),
            uid: summary.uid,
            subject: summary.subject().map(str::to_string),
            from: summary.from().map(str::to_string),
            date: summary.date().map(str::to_string),
            text: summary.preview.clone(),
            category: summary.classification,
        }
    }

    pub fn from_content(account_id: &str, content: &MessageContent, category: Category) -> Self {
        Self {
            account_id: account_id.to_string(),
            uid: content.uid,
            subject: content.subject.clone(),
            from: content.from.clone(),
            date: content.date.clone(),
            text: content.text.clone().unwrap_or_default(),
            category,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert. Failures are logged by the sink and reported as `false`.
    async fn notify(&self, alert: &Alert) -> bool;

    /// Send a connectivity check message.
    async fn test_connection(&self) -> bool;
}

/// Sink used when no webhook is configured.
#[derive(Debug, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, alert: &Alert) -> bool {
        tracing::debug!(
            account = %alert.account_id,
            uid = alert.uid,
            "Notification skipped, no sink configured"
        );
        false
    }

    async fn test_connection(&self) -> bool {
        tracing::info!("Notification test skipped, no sink configured");
        false
    }
}

/// Fire-and-forget front of a [`Notifier`].
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Build the dispatcher for an optional webhook URL.
    pub fn from_webhook(webhook_url: Option<&str>) -> Self {
        match webhook_url.filter(|url| !url.trim().is_empty()) {
            Some(url) => {
                tracing::info!("Slack notifications enabled");
                Self::new(Arc::new(SlackNotifier::new(url)))
            }
            None => {
                tracing::info!("Slack notifications disabled, webhook URL not provided");
                Self::new(Arc::new(DisabledNotifier))
            }
        }
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Send the alert on its own task. The handle is only awaited in tests.
    pub fn dispatch(&self, alert: Alert) -> JoinHandle<bool> {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let sent = notifier.notify(&alert).await;
            if sent {
                tracing::info!(account = %alert.account_id, uid = alert.uid, "Alert sent");
            }
            sent
        })
    }
}
