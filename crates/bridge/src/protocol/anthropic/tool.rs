use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::unknown_fields::UnknownFields;

/// A tool specification as it appears in `MessageCreateParams.tools`.
///
/// Client (custom) tools carry `input_schema`; built-ins (`bash_20250124`,
/// `text_editor_20250124`, `web_search_20250305`, …) carry only `type` and
/// `name`. Both shapes are modeled on one struct rather than an enum because
/// the discriminating field (`input_schema` present or not) isn't a clean
/// serde tag — `type` exists on both but means "schema version" on the
/// built-in side and isn't present at all on the custom side in older
/// clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
    /// Unique tool name surfaced to the model and in tool_use blocks.
    pub name: String,

    /// Optional natural-language description of the tool's purpose.
    #[serde(default)]
    pub description: Option<String>,

    /// JSON Schema describing the tool's expected input payload. Present
    /// for custom tools, absent for built-ins.
    #[serde(default)]
    pub input_schema: Option<Value>,

    /// Built-in tool discriminator (e.g. `"bash_20250124"`), absent for
    /// custom tools.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Additional tool fields forwarded unchanged.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

impl Tool {
    /// A client-supplied tool carries a JSON Schema; builtins don't.
    pub fn is_custom(&self) -> bool {
        self.input_schema.is_some()
    }
}

/// Controls how the model may interact with tools.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto {
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    Any {
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    Tool {
        /// Name of the required tool.
        name: String,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    /// Any `type` this gateway doesn't recognize yet; maps to `"auto"` upstream.
    #[serde(other)]
    Unknown,
}
