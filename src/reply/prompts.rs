//! Prompts for reply generation

use crate::classify::Category;
use crate::constants::REPLY_PROMPT_PREVIEW_CHARS;
use crate::mail::MessageContent;
use crate::mail::parser::truncate_chars;

/// System prompt for reply drafting
pub const REPLY_SYSTEM: &str = r#"You are a professional email assistant. Generate appropriate, concise, and professional email replies based on the content and classification provided. Keep responses under 200 words and maintain a business-appropriate tone."#;

/// User prompt carrying the message and its category.
pub fn reply_prompt(content: &MessageContent, category: Category) -> String {
    let subject = content.subject.as_deref().unwrap_or("No subject");
    let from = content.from.as_deref().unwrap_or("Unknown sender");
    let preview = truncate_chars(content.text.as_deref().unwrap_or(""), REPLY_PROMPT_PREVIEW_CHARS);

    format!(
        r#"Please generate a professional email reply for the following email:

Classification: {category}
From: {from}
Subject: {subject}
Content Preview: {preview}

Based on the classification "{category}", please generate an appropriate reply that:
1. Acknowledges the email professionally
2. Responds appropriately to the classification type
3. Is concise and business-appropriate
4. Includes a professional closing

Do not include email headers (To:, From:, Subject:) in your response, just the email body content."#
    )
}
