use async_trait::async_trait;
use quorum_models::{ChatRole, DialogMessage};
use serde::{Deserialize, Serialize};

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;

/// Chat turns share the dialog message shape.
pub type ChatMessage = DialogMessage;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    /// Backend-specific metadata.
    pub raw: serde_json::Value,
}

/// Language-model backend used by the decision trigger loop.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn name(&self) -> &str;
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, AgentError>;
}

/// Model client backed by the `claude` CLI.
///
/// The CLI takes one system prompt and one user prompt, so system turns are
/// joined and the remaining turns are rendered as a transcript. Sampling
/// options are not exposed by the CLI and are ignored.
pub struct ClaudeCliModel {
    name: String,
    config: ClaudeCliConfig,
}

impl ClaudeCliModel {
    pub fn new(name: impl Into<String>, config: ClaudeCliConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

#[async_trait]
impl ModelClient for ClaudeCliModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<ChatResponse, AgentError> {
        let (system_prompt, user_prompt) = render_prompt(messages);
        let content = invoke_claude(&system_prompt, &user_prompt, &self.config).await?;
        Ok(ChatResponse {
            content,
            raw: serde_json::json!({
                "backend": "claude-cli",
                "model": self.config.model,
            }),
        })
    }
}

/// Split chat turns into a system prompt and a single user prompt.
pub fn render_prompt(messages: &[ChatMessage]) -> (String, String) {
    let system = messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let turns: Vec<&ChatMessage> = messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .collect();

    let user = match turns.as_slice() {
        [only] if only.role == ChatRole::User => only.content.clone(),
        _ => turns
            .iter()
            .map(|m| format!("[{}]\n{}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n"),
    };

    (system, user)
}
