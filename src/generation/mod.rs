// Generation module
// Capability interface for hosted language models plus the prompt shape they consume

pub mod anthropic;

use async_trait::async_trait;
use serde::Serialize;

use crate::Result;

pub use anthropic::AnthropicClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

/// System instruction followed by alternating user/assistant messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub messages: Vec<PromptMessage>,
}

impl Prompt {
    #[inline]
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: Vec::new(),
        }
    }

    #[inline]
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(PromptMessage {
            role: Role::User,
            content: content.into(),
        });
    }

    #[inline]
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(PromptMessage {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    /// Content of the final message, which carries the question being asked
    #[inline]
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Turns a prompt into completion text
///
/// Throttling is reported as [`crate::RagError::RateLimit`]; every other
/// failure, including an empty completion, as [`crate::RagError::Generation`].
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}
