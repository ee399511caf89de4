//! Context management utilities for manual history management.
//!
//! These are opt-in helpers - nothing is automatic. [`crate::history::ChatHistory`]
//! uses [`truncate_messages`]'s eviction policy internally for window trimming;
//! callers working directly with a `Vec<Message>` (outside a `ChatHistory`) can use
//! these functions the same way.
//!
//! # Note
//!
//! [`estimate_tokens`] is a character-based APPROXIMATION (1 token ≈ 4 characters).
//! Actual token counts vary by model family; always include a 10-20% safety margin
//! when checking limits. Token counting as a first-class, tokenizer-accurate service
//! is explicitly a non-goal of this framework.

use crate::types::{ContentBlock, Message, MessageRole};

/// Estimate token count for a message list using character-based approximation.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0;

    for message in messages {
        total_chars += 8; // ~2 tokens for role formatting

        for block in &message.content {
            match block {
                ContentBlock::Text(text) => {
                    total_chars += text.text.len();
                }
                ContentBlock::ToolUse(tool) => {
                    total_chars += tool.name.len();
                    total_chars += tool.id.len();
                    total_chars += tool.arguments_json.len();
                }
                ContentBlock::ToolResult(result) => {
                    total_chars += result.tool_use_id.len();
                    total_chars += result.content.len();
                }
                ContentBlock::Null => {}
            }
        }

        for attachment in &message.attachments {
            total_chars += attachment.content.len().min(64); // attachments are mostly opaque
        }
    }

    total_chars += 16; // conversation-level overhead

    (total_chars + 3) / 4
}

/// Truncate message history, keeping recent messages.
///
/// Always preserves the system prompt (if present and `preserve_system`) and keeps
/// the most recent `keep` messages. This is a simple truncation - it does NOT
/// attempt to preserve tool-call chains.
pub fn truncate_messages(messages: &[Message], keep: usize, preserve_system: bool) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    if messages.len() <= keep {
        return messages.to_vec();
    }

    let has_system = preserve_system && messages[0].role == MessageRole::System;

    if has_system {
        let mut result = vec![messages[0].clone()];
        if keep > 0 && messages.len() > 1 {
            let start = messages.len().saturating_sub(keep);
            result.extend_from_slice(&messages[start..]);
        }
        result
    } else if keep > 0 {
        let start = messages.len().saturating_sub(keep);
        messages[start..].to_vec()
    } else {
        Vec::new()
    }
}

/// Check if history is approaching a token limit (`estimated > limit * margin`).
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn test_estimate_tokens_empty() {
        let messages: Vec<Message> = vec![];
        assert_eq!(estimate_tokens(&messages), 0);
    }

    #[test]
    fn test_estimate_tokens_simple() {
        let messages = vec![Message::user("Hello world")];
        let tokens = estimate_tokens(&messages);
        assert!(tokens >= 3 && tokens <= 10);
    }

    #[test]
    fn test_truncate_messages_preserve_system() {
        let messages = vec![
            Message::system("System prompt"),
            Message::user("Message 1"),
            Message::user("Message 2"),
            Message::user("Message 3"),
            Message::user("Message 4"),
        ];

        let truncated = truncate_messages(&messages, 2, true);

        assert_eq!(truncated.len(), 3);
        assert_eq!(truncated[0].role, MessageRole::System);
    }

    #[test]
    fn test_truncate_messages_no_preserve() {
        let messages = vec![
            Message::system("System prompt"),
            Message::user("Message 1"),
            Message::user("Message 2"),
            Message::user("Message 3"),
        ];

        let truncated = truncate_messages(&messages, 2, false);

        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated[0].role, MessageRole::User);
    }

    #[test]
    fn test_truncate_messages_keep_all() {
        let messages = vec![Message::user("Message 1"), Message::user("Message 2")];
        let truncated = truncate_messages(&messages, 10, true);
        assert_eq!(truncated.len(), 2);
    }

    #[test]
    fn test_is_approaching_limit() {
        let messages = vec![Message::user("x".repeat(1000))];
        assert!(!is_approaching_limit(&messages, 1000, 0.9));
        assert!(is_approaching_limit(&messages, 200, 0.9));
    }
}
