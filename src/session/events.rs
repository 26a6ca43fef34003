//! Events delivered to the caller of the session manager.

use serde::Serialize;
use tokio::sync::mpsc;

use super::error::{ErrorKind, SessionError};
use super::state::SessionState;
use crate::classify::Category;
use crate::mail::{MessageContent, MessageSummary};

/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    EmailsList {
        account_id: String,
        emails: Vec<MessageSummary>,
    },
    #[serde(rename_all = "camelCase")]
    EmailContent {
        account_id: String,
        uid: u32,
        content: MessageContent,
        classification: Category,
    },
    #[serde(rename_all = "camelCase")]
    EmailContentError {
        account_id: String,
        uid: u32,
        error: String,
        kind: ErrorKind,
    },
    #[serde(rename_all = "camelCase")]
    SessionState {
        account_id: String,
        state: SessionState,
    },
    #[serde(rename_all = "camelCase")]
    AccountFailed {
        account_id: String,
        attempts: u32,
        error: String,
    },
}

impl SessionEvent {
    pub fn content_error(account_id: &str, uid: u32, error: &SessionError) -> Self {
        SessionEvent::EmailContentError {
            account_id: account_id.to_string(),
            uid,
            error: error.to_string(),
            kind: error.kind(),
        }
    }
}

/// Background delivery: never blocks the worker, a full or closed channel drops the event.
pub(crate) fn emit(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(e) = events.try_send(event) {
        tracing::warn!("Dropping session event: {}", e);
    }
}

/// Deliver the answer to a caller's request, waiting for room in the channel.
pub(crate) async fn deliver(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if events.send(event).await.is_err() {
        tracing::warn!("Event stream closed, dropping response");
    }
}
