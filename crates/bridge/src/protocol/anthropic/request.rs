use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::unknown_fields::UnknownFields;

use super::tool::{Tool, ToolChoice};

/// `MessageCreateParams` — the body of `POST /v1/messages`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Request {
    /// The model requested by the client. Replaced wholesale by the single
    /// configured upstream model; unknown names are never an error.
    pub model: String,
    /// Conversation turns supplied to the Messages API.
    pub messages: Vec<InputMessage>,
    /// Maximum output tokens the model may generate.
    pub max_tokens: u32,

    /// System prompt providing global instructions for the assistant.
    #[serde(default)]
    pub system: Option<SystemPrompt>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub top_p: Option<f32>,

    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,

    /// When true, deliver a Server-Sent Events stream instead of a single body.
    #[serde(default)]
    pub stream: Option<bool>,

    #[serde(default)]
    pub metadata: Option<Metadata>,

    /// Tool specifications the model may call during this request.
    #[serde(default)]
    pub tools: Option<Vec<Tool>>,

    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,

    /// Additional undocumented fields preserved for forward compatibility.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// System prompt payload accepted by the Messages API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    /// Plain-text system prompt.
    Text(String),
    /// Structured system prompt comprised of text blocks, joined with a
    /// blank line between each when translated upstream.
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metadata {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// A single turn in the conversation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputMessage {
    pub role: Role,
    pub content: InputMessageContent,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Message content is either a plain string or an ordered list of blocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputMessageContent {
    Text(String),
    Items(Vec<InputContentBlock>),
}

/// Request-side content blocks. Only the kinds the message-conversion
/// rules names are modeled explicitly; anything else falls into `Unknown`
/// and is skipped during translation so forward-compatible clients don't
/// crash the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContentBlock {
    Text {
        text: String,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    Image {
        source: ImageSource,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<ToolResultContent>,
        #[serde(default)]
        is_error: Option<bool>,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    /// Any block `type` this gateway doesn't recognize yet; skipped during translation.
    #[serde(other)]
    Unknown,
}

/// A tool result's `content` may be a bare string or a list of blocks; the
/// translator flattens either shape to a single string before forwarding it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<Value>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Base64 {
        media_type: String,
        data: String,
    },
    Url {
        url: String,
    },
    /// Any `type` this gateway doesn't recognize yet.
    #[serde(other)]
    Unknown,
}
