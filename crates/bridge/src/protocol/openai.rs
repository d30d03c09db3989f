//! Types for OpenAI's Responses API — the upstream this gateway calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body posted to `POST /v1/responses`.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub model: String,
    pub input: Vec<InputItem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    pub max_output_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    pub stream: bool,
}

/// An element of the upstream `input` array.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message {
        role: String,
        content: MessageContent,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

impl InputItem {
    /// `call_id` this item references, for the function_call /
    /// function_call_output pairing check C2 runs before sending upstream.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            InputItem::FunctionCall { call_id, .. } => Some(call_id),
            InputItem::FunctionCallOutput { call_id, .. } => Some(call_id),
            InputItem::Message { .. } => None,
        }
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self, InputItem::FunctionCall { .. })
    }

    pub fn is_function_call_output(&self) -> bool {
        matches!(self, InputItem::FunctionCallOutput { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<MessagePart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    InputText { text: String },
    InputImage { image_url: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl Tool {
    pub fn function(name: String, description: Option<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            name: Some(name),
            description,
            parameters: Some(parameters),
            strict: Some(true),
        }
    }

    pub fn web_search() -> Self {
        Self {
            kind: "web_search".to_string(),
            name: None,
            description: None,
            parameters: None,
            strict: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Function { #[serde(rename = "type")] kind: String, name: String },
}

/// Non-streaming response object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<ResponseUsage>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IncompleteDetails {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResponseUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<OutputContentPart>,
    },
    FunctionCall {
        id: String,
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContentPart {
    OutputText { text: String },
    #[serde(other)]
    Other,
}

/// Streaming event surface consumed by the C5 state machine. Every variant
/// the gateway acts on is named explicitly; anything else collapses into
/// [`StreamEvent::Unknown`] so new upstream event types never break parsing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "response.created")]
    ResponseCreated { response: ResponseIdentity },
    #[serde(rename = "response.in_progress")]
    ResponseInProgress,
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone,
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: OutputItem },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: OutputItem },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { item_id: String, delta: String },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone { item_id: String },
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        #[serde(default)]
        part: Option<OutputContentPart>,
    },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        #[serde(default)]
        part: Option<OutputContentPart>,
    },
    #[serde(rename = "response.web_search_call.in_progress")]
    WebSearchCallInProgress,
    #[serde(rename = "response.web_search_call.searching")]
    WebSearchCallSearching,
    #[serde(rename = "response.web_search_call.completed")]
    WebSearchCallCompleted,
    #[serde(rename = "response.failed")]
    ResponseFailed,
    #[serde(rename = "response.incomplete")]
    ResponseIncomplete,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "response.completed")]
    ResponseCompleted { response: Response },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseIdentity {
    pub id: String,
}
