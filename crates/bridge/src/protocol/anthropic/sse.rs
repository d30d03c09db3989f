use serde::{Deserialize, Serialize};

use super::response::{ErrorBody, Message, ResponseContentBlock, StopReason, Usage};

/// Downstream SSE event surface. Each variant's serialized `type` field is
/// also the SSE `event:` name the emitter writes on the line above `data:`.
///
/// A session always opens with [`StreamEvent::MessageStart`] and closes with
/// [`StreamEvent::MessageStop`]; in between, zero or more content block
/// lifecycles (`content_block_start` → `content_block_delta*` →
/// `content_block_stop`) and `ping` heartbeats may appear.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart { message: StreamMessageStart },
    ContentBlockStart { index: u32, content_block: ContentBlockStart },
    ContentBlockDelta { index: u32, delta: ContentDelta },
    ContentBlockStop { index: u32 },
    MessageDelta { delta: MessageDelta, usage: Usage },
    MessageStop,
    Error { error: ErrorBody },
}

/// The partial `message` object carried by `message_start`. Content is always
/// empty at this point; it fills in via subsequent content block events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessageStart {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: super::request::Role,
    pub content: Vec<ResponseContentBlock>,
    pub model: String,
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

impl StreamMessageStart {
    pub fn new(id: String, model: String) -> Self {
        Self {
            id,
            kind: "message".to_string(),
            role: super::request::Role::Assistant,
            content: Vec::new(),
            model,
            stop_reason: None,
            stop_sequence: None,
            usage: Usage::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockStart {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDelta {
    pub stop_reason: StopReason,
    pub stop_sequence: Option<String>,
}

impl From<Message> for StreamMessageStart {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            kind: message.kind,
            role: message.role,
            content: Vec::new(),
            model: message.model,
            stop_reason: None,
            stop_sequence: None,
            usage: message.usage,
        }
    }
}
