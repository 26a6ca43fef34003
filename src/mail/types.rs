use serde::Serialize;
use std::collections::BTreeMap;

use crate::classify::{Category, Classifiable};

/// Lower-cased header name to its values, in message order.
pub type HeaderFields = BTreeMap<String, Vec<String>>;

/// List-view message: headers plus a bounded text preview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub account_id: String,
    pub uid: u32,
    pub headers: HeaderFields,
    pub preview: String,
    pub classification: Category,
}

impl MessageSummary {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.header("subject")
    }

    pub fn from(&self) -> Option<&str> {
        self.header("from")
    }

    pub fn date(&self) -> Option<&str> {
        self.header("date")
    }
}

impl Classifiable for MessageSummary {
    fn subject(&self) -> Option<&str> {
        self.header("subject")
    }

    fn text(&self) -> Option<&str> {
        Some(&self.preview)
    }
}

/// Metadata for one attachment of a fully fetched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub filename: Option<String>,
    pub content_type: String,
    pub size: usize,
}

/// Full-view message, parsed from the complete RFC 5322 source.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    pub uid: u32,
    pub subject: Option<String>,
    /// Display form, `Name <addr>` when a name is present
    pub from: Option<String>,
    pub to: Option<String>,
    /// RFC 3339
    pub date: Option<String>,
    pub message_id: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<AttachmentInfo>,
}

impl Classifiable for MessageContent {
    fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// Header summary bundled with a generated reply.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderSummary {
    pub subject: Option<String>,
    pub from: String,
    pub date: Option<String>,
}

impl From<&MessageContent> for HeaderSummary {
    fn from(content: &MessageContent) -> Self {
        Self {
            subject: content.subject.clone(),
            from: content
                .from
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            date: content.date.clone(),
        }
    }
}
