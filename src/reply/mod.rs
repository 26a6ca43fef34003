//! Reply drafting for classified messages.
//!
//! A chat model is used when an API key is configured. Every failure path
//! falls back to a per-category template, so callers always get a reply.

mod client;
mod prompts;
mod templates;

pub use client::ChatClient;
pub use templates::template_reply;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::actor::{RetryConfig, with_retry};
use crate::classify::Category;
use crate::config::ReplyConfig;
use crate::mail::MessageContent;

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplySource {
    #[serde(rename = "OpenAI GPT")]
    Model,
    #[serde(rename = "Template (Fallback)")]
    Template,
}

impl fmt::Display for ReplySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplySource::Model => write!(f, "OpenAI GPT"),
            ReplySource::Template => write!(f, "Template (Fallback)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedReply {
    pub success: bool,
    pub reply: String,
    pub source: ReplySource,
}

impl GeneratedReply {
    pub fn template(content: &MessageContent, category: Category) -> Self {
        Self {
            success: true,
            reply: template_reply(category, content.from.as_deref()),
            source: ReplySource::Template,
        }
    }
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Draft a reply. Never fails; falls back to a template internally.
    async fn generate(&self, content: &MessageContent, category: Category) -> GeneratedReply;
}

/// Template-only generator.
#[derive(Debug, Default)]
pub struct TemplateReplies;

#[async_trait]
impl ReplyGenerator for TemplateReplies {
    async fn generate(&self, content: &MessageContent, category: Category) -> GeneratedReply {
        GeneratedReply::template(content, category)
    }
}

/// Chat-model generator with template fallback.
pub struct LlmReplyGenerator {
    client: Option<ChatClient>,
    retry: RetryConfig,
}

impl LlmReplyGenerator {
    pub fn new(config: &ReplyConfig) -> Self {
        let client = match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => match ChatClient::new(key, config) {
                Ok(client) => {
                    tracing::info!("Reply generation enabled with model {}", config.model);
                    Some(client)
                }
                Err(e) => {
                    tracing::warn!("Reply model unavailable, using templates: {:#}", e);
                    None
                }
            },
            None => {
                tracing::info!("Reply generation using templates, API key not provided");
                None
            }
        };

        Self {
            client,
            retry: RetryConfig::new(1, Duration::from_millis(500), Duration::from_secs(2)),
        }
    }

    pub fn client(&self) -> Option<&ChatClient> {
        self.client.as_ref()
    }
}

#[async_trait]
impl ReplyGenerator for LlmReplyGenerator {
    async fn generate(&self, content: &MessageContent, category: Category) -> GeneratedReply {
        let Some(client) = &self.client else {
            tracing::debug!("Using fallback reply for {:?}", content.subject);
            return GeneratedReply::template(content, category);
        };

        let prompt = prompts::reply_prompt(content, category);
        let result = with_retry(&self.retry, || {
            client.complete(prompts::REPLY_SYSTEM, &prompt)
        })
        .await;

        match result {
            Ok(reply) => {
                tracing::info!("Generated model reply for {:?}", content.subject);
                GeneratedReply {
                    success: true,
                    reply,
                    source: ReplySource::Model,
                }
            }
            Err(e) => {
                tracing::warn!("Reply generation failed, falling back to template: {:#}", e);
                GeneratedReply::template(content, category)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> MessageContent {
        MessageContent {
            uid: 1,
            subject: Some("Re: proposal".into()),
            from: Some("Jane Doe <jane@example.com>".into()),
            text: Some("This sounds good, tell me more".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_without_key_uses_template() {
        let generator = LlmReplyGenerator::new(&ReplyConfig::default());
        assert!(generator.client().is_none());

        let reply = generator.generate(&content(), Category::Interested).await;
        assert!(reply.success);
        assert_eq!(reply.source, ReplySource::Template);
        assert!(reply.reply.contains("Jane"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_falls_back() {
        let config = ReplyConfig {
            api_key: Some("sk-test".into()),
            endpoint: "http://127.0.0.1:9/v1/chat/completions".into(),
            ..ReplyConfig::default()
        };
        let generator = LlmReplyGenerator::new(&config);
        let reply = generator.generate(&content(), Category::MeetingBooked).await;

        assert!(reply.success);
        assert_eq!(reply.source, ReplySource::Template);
        assert!(reply.reply.starts_with("Thank you for confirming our meeting, Jane."));
    }

    #[test]
    fn test_source_tags() {
        assert_eq!(serde_json::to_value(ReplySource::Model).unwrap(), "OpenAI GPT");
        assert_eq!(
            serde_json::to_value(ReplySource::Template).unwrap(),
            "Template (Fallback)"
        );
        assert_eq!(ReplySource::Template.to_string(), "Template (Fallback)");
    }
}
