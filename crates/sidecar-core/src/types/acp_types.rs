//! ACP (Agent Client Protocol) type definitions, agent side
//!
//! Based on the ACP specification at https://agentclientprotocol.com

use super::ContentBlock;
use serde::{Deserialize, Serialize};

/// ACP protocol version supported by this agent
pub const ACP_PROTOCOL_VERSION: u32 = 1;

/// Agent capabilities advertised during initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub load_session: bool,
}

/// Prompt capabilities advertised during initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptCapabilities {
    pub supports_image: bool,
    pub supports_audio: bool,
    pub supports_resources: bool,
}

/// Initialize response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: u32,
    pub agent_capabilities: AgentCapabilities,
    pub prompt_capabilities: PromptCapabilities,
}

impl Default for InitializeResult {
    fn default() -> Self {
        Self {
            protocol_version: ACP_PROTOCOL_VERSION,
            agent_capabilities: AgentCapabilities { load_session: false },
            prompt_capabilities: PromptCapabilities {
                supports_image: true,
                supports_audio: false,
                supports_resources: true,
            },
        }
    }
}

/// session/new response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNewResult {
    pub session_id: String,
}

/// session/prompt request parameters
///
/// Clients vary: the prompt arrives either under `prompt` (a content-block
/// array or a bare string) or under `messages`. Both are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPromptParams {
    pub session_id: String,
    #[serde(default)]
    pub prompt: Option<serde_json::Value>,
    #[serde(default)]
    pub messages: Option<serde_json::Value>,
}

impl SessionPromptParams {
    /// Concatenated text of the prompt, whichever field carries it.
    ///
    /// Only `{type: "text"}` content blocks contribute; other block
    /// kinds (images, resources) are accepted but skipped.
    pub fn text(&self) -> String {
        let value = self.prompt.as_ref().or(self.messages.as_ref());
        let Some(value) = value else {
            return String::new();
        };

        match value {
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Array(blocks) => blocks
                .iter()
                .filter_map(|block| match serde_json::from_value::<ContentBlock>(block.clone()) {
                    Ok(ContentBlock::Text { text }) => Some(text),
                    _ => None,
                })
                .collect(),
            _ => String::new(),
        }
    }
}

/// session/prompt response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResult {
    pub stop_reason: StopReason,
}

/// Terminal classification of a prompt turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    Cancelled,
}

/// session/cancel parameters (request or notification form)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCancelParams {
    pub session_id: String,
}

/// session/update notification payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdateNotification {
    pub session_id: String,
    pub update: SessionUpdate,
}

/// Session update union
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdate {
    AgentMessageChunk { content: ContentBlock },
}
