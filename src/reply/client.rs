//! OpenAI-compatible chat completions client

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ReplyConfig;
use crate::constants::HTTP_TIMEOUT_SECS;

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatClient {
    pub fn new(api_key: &str, config: &ReplyConfig) -> Result<Self> {
        let client = Client::builder()
            // Completions are slower than webhooks
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS * 3))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Send a chat completion request and return the trimmed reply text.
    pub async fn complete(&self, system_prompt: &str, user_content: &str) -> Result<String> {
        self.complete_with(system_prompt, user_content, self.max_tokens)
            .await
    }

    async fn complete_with(
        &self,
        system_prompt: &str,
        user_content: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system_prompt,
                },
                Message {
                    role: "user",
                    content: user_content,
                },
            ],
            max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to chat completions endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat completions API error ({}): {}", status, error_text);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completions response")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No response content from model"))
    }

    /// Minimal round-trip used by `mailsift check`.
    pub async fn test_connection(&self) -> Result<String> {
        self.complete_with(
            "You are a connectivity check.",
            "Reply with just 'Test successful' if you can read this.",
            10,
        )
        .await
    }
}
