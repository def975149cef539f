//! Core type definitions for Sidecar
//!
//! Wire-level JSON-RPC envelopes and the ACP method payloads built on
//! top of them.

mod acp_types;
mod rpc_types;

pub use acp_types::*;
pub use rpc_types::*;

use serde::{Deserialize, Serialize};

/// Content block inside prompts and session updates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}
