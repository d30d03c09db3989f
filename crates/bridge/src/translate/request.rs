//! Request Translator (C2): downstream `MessageCreateParams` → upstream
//! `responses` request.

use serde_json::Value;
use uuid::Uuid;

use crate::{
    correlation::{Conversation, ToolBinding},
    error::TranslationError,
    protocol::{anthropic, openai},
    schema,
};

/// Output of the request translation, aside from the upstream request itself:
/// bindings minted for tool_use blocks that didn't already have one, to be
/// merged into the conversation once the turn completes.
pub struct Translated {
    pub request: openai::Request,
    pub new_bindings: Vec<(String, ToolBinding)>,
}

/// Floor applied to `max_tokens` when mapping to `max_output_tokens`.
const MAX_OUTPUT_TOKENS_FLOOR: u32 = 16_384;

pub fn translate_request(
    request: &anthropic::Request,
    conversation: &Conversation,
    upstream_model: &str,
) -> Result<Translated, TranslationError> {
    let mut new_bindings = Vec::new();
    let mut input = Vec::new();

    let instructions = request.system.as_ref().map(join_system_prompt);

    for message in &request.messages {
        convert_message(message, conversation, &mut new_bindings, &mut input)?;
    }

    post_filter_unpaired_function_calls(&mut input);

    let mut tools: Vec<openai::Tool> = request
        .tools
        .iter()
        .flatten()
        .filter_map(convert_tool)
        .collect();
    // The upstream's own web-search tool is appended unconditionally; a
    // client-declared `web_search_*` builtin maps onto the same tool rather
    // than emitting a duplicate.
    if !tools.iter().any(|tool| tool.kind == "web_search") {
        tools.push(openai::Tool::web_search());
    }

    let tool_choice = request.tool_choice.as_ref().map(convert_tool_choice);

    let max_output_tokens = request.max_tokens.max(MAX_OUTPUT_TOKENS_FLOOR);

    let upstream = openai::Request {
        model: upstream_model.to_string(),
        input,
        instructions,
        max_output_tokens,
        top_p: request.top_p,
        previous_response_id: conversation.last_response_id.clone(),
        tools,
        tool_choice,
        stream: request.stream.unwrap_or(false),
    };

    Ok(Translated {
        request: upstream,
        new_bindings,
    })
}

fn join_system_prompt(system: &anthropic::SystemPrompt) -> String {
    match system {
        anthropic::SystemPrompt::Text(text) => text.clone(),
        anthropic::SystemPrompt::Blocks(blocks) => blocks
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

/// Converts one downstream tool spec. Custom tools (carrying `input_schema`)
/// become strict-mode function tools. Known built-ins map to a canonical
/// function-tool definition; the upstream web-search builtin is folded into
/// the unconditional web_search tool appended by the caller, so it yields
/// nothing here. Unknown built-ins are dropped with a warning.
fn convert_tool(tool: &anthropic::Tool) -> Option<openai::Tool> {
    if let Some(schema) = &tool.input_schema {
        let normalized = schema::normalize(schema);
        return Some(openai::Tool::function(tool.name.clone(), tool.description.clone(), normalized));
    }

    let kind = tool.kind.as_deref().unwrap_or_default();

    if kind.starts_with("web_search_") {
        return None;
    }

    if kind.starts_with("bash_") {
        return Some(openai::Tool::function(
            "bash".to_string(),
            Some("Runs a shell command and returns its output.".to_string()),
            schema::normalize(&serde_json::json!({
                "type": "object",
                "properties": {"command": {"type": "string"}},
                "required": ["command"],
            })),
        ));
    }

    if kind.starts_with("text_editor_") {
        return Some(openai::Tool::function(
            "str_replace_editor".to_string(),
            Some("Views, creates, and edits files.".to_string()),
            schema::normalize(&serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "path": {"type": "string"},
                    "file_text": {"type": "string"},
                    "old_str": {"type": "string"},
                    "new_str": {"type": "string"},
                },
                "required": ["command", "path"],
            })),
        ));
    }

    log::warn!("dropping unknown built-in tool {kind:?}");
    None
}

fn convert_tool_choice(choice: &anthropic::ToolChoice) -> openai::ToolChoice {
    match choice {
        anthropic::ToolChoice::Tool { name, .. } => openai::ToolChoice::Function {
            kind: "function".to_string(),
            name: name.clone(),
        },
        anthropic::ToolChoice::Any { .. } => openai::ToolChoice::Mode("required".to_string()),
        anthropic::ToolChoice::Auto { .. } | anthropic::ToolChoice::Unknown => {
            openai::ToolChoice::Mode("auto".to_string())
        }
    }
}

fn role_str(role: anthropic::Role) -> String {
    match role {
        anthropic::Role::User => "user".to_string(),
        anthropic::Role::Assistant => "assistant".to_string(),
    }
}

/// Buffer of plain-text fragments accumulated since the last flush, along
/// with the role they belong to.
struct TextBuffer {
    role: anthropic::Role,
    parts: Vec<String>,
}

impl TextBuffer {
    fn new(role: anthropic::Role) -> Self {
        Self { role, parts: Vec::new() }
    }

    fn push(&mut self, text: &str) {
        self.parts.push(text.to_string());
    }

    fn flush(&mut self, out: &mut Vec<openai::InputItem>) {
        if self.parts.is_empty() {
            return;
        }

        let content = match self.role {
            // Assistant buffers collapse to a single plain-text message.
            anthropic::Role::Assistant => openai::MessageContent::Text(self.parts.join("")),
            // User buffers of multiple parts emit a content list of text parts.
            anthropic::Role::User if self.parts.len() > 1 => openai::MessageContent::Parts(
                self.parts
                    .iter()
                    .map(|text| openai::MessagePart::InputText { text: text.clone() })
                    .collect(),
            ),
            anthropic::Role::User => openai::MessageContent::Text(self.parts[0].clone()),
        };

        out.push(openai::InputItem::Message {
            role: role_str(self.role),
            content,
        });

        self.parts.clear();
    }
}

fn convert_message(
    message: &anthropic::InputMessage,
    conversation: &Conversation,
    new_bindings: &mut Vec<(String, ToolBinding)>,
    out: &mut Vec<openai::InputItem>,
) -> Result<(), TranslationError> {
    match &message.content {
        anthropic::InputMessageContent::Text(text) => {
            out.push(openai::InputItem::Message {
                role: role_str(message.role),
                content: openai::MessageContent::Text(text.clone()),
            });
        }
        anthropic::InputMessageContent::Items(blocks) => {
            let mut buffer = TextBuffer::new(message.role);

            for block in blocks {
                match block {
                    anthropic::InputContentBlock::Text { text, .. } => buffer.push(text),
                    anthropic::InputContentBlock::ToolUse { id, name, input, .. } => {
                        buffer.flush(out);

                        let call_id = conversation
                            .call_id_for_tool_use(id)
                            .map(str::to_string)
                            .unwrap_or_else(|| {
                                let minted = format!("call_{}", Uuid::new_v4().simple());
                                new_bindings.push((
                                    minted.clone(),
                                    ToolBinding {
                                        tool_use_id: id.clone(),
                                        name: name.clone(),
                                    },
                                ));
                                minted
                            });

                        out.push(openai::InputItem::FunctionCall {
                            call_id,
                            name: name.clone(),
                            arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                        });
                    }
                    anthropic::InputContentBlock::ToolResult {
                        tool_use_id, content, ..
                    } => {
                        buffer.flush(out);

                        let call_id = conversation
                            .call_id_for_tool_use(tool_use_id)
                            .map(str::to_string)
                            .unwrap_or_else(|| {
                                log::warn!(
                                    "no call_id binding for tool_use_id {tool_use_id}; \
                                     falling back to the downstream id verbatim"
                                );
                                tool_use_id.clone()
                            });

                        out.push(openai::InputItem::FunctionCallOutput {
                            call_id,
                            output: flatten_tool_result_content(content.as_ref()),
                        });
                    }
                    anthropic::InputContentBlock::Image { source, .. } => {
                        buffer.flush(out);

                        let image_url = match source {
                            anthropic::ImageSource::Base64 { media_type, data } => {
                                format!("data:{media_type};base64,{data}")
                            }
                            anthropic::ImageSource::Url { url } => url.clone(),
                            anthropic::ImageSource::Unknown => return Err(TranslationError::UnsupportedImage),
                        };

                        out.push(openai::InputItem::Message {
                            role: "user".to_string(),
                            content: openai::MessageContent::Parts(vec![openai::MessagePart::InputImage {
                                image_url,
                            }]),
                        });
                    }
                    anthropic::InputContentBlock::Unknown => {}
                }
            }

            buffer.flush(out);
        }
    }

    Ok(())
}

fn flatten_tool_result_content(content: Option<&anthropic::ToolResultContent>) -> String {
    match content {
        None => String::new(),
        Some(anthropic::ToolResultContent::Text(text)) => text.clone(),
        Some(anthropic::ToolResultContent::Blocks(blocks)) => {
            let joined: Vec<String> = blocks
                .iter()
                .map(|block| match block.get("text").and_then(Value::as_str) {
                    Some(text) => text.to_string(),
                    None => block.to_string(),
                })
                .collect();
            joined.join("")
        }
    }
}

/// Drops any `function_call` whose `call_id` has no matching
/// `function_call_output` in the same list. Unpaired function calls are
/// rejected by the upstream; dropping lets the model re-issue them if needed.
fn post_filter_unpaired_function_calls(items: &mut Vec<openai::InputItem>) {
    let paired: std::collections::HashSet<&str> = items
        .iter()
        .filter(|item| item.is_function_call_output())
        .filter_map(openai::InputItem::call_id)
        .collect();

    items.retain(|item| !item.is_function_call() || item.call_id().is_some_and(|id| paired.contains(id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_text(text: &str) -> anthropic::InputMessage {
        anthropic::InputMessage {
            role: anthropic::Role::User,
            content: anthropic::InputMessageContent::Text(text.to_string()),
            unknown_fields: Default::default(),
        }
    }

    fn base_request(messages: Vec<anthropic::InputMessage>) -> anthropic::Request {
        anthropic::Request {
            model: "claude-opus-4".to_string(),
            messages,
            max_tokens: 1024,
            system: None,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: Some(true),
            metadata: None,
            tools: None,
            tool_choice: None,
            unknown_fields: Default::default(),
        }
    }

    #[test]
    fn plain_text_message_round_trips() {
        let request = base_request(vec![user_text("Hello")]);
        let conversation = Conversation::default();

        let translated = translate_request(&request, &conversation, "gpt-4.1").unwrap();

        assert_eq!(translated.request.input.len(), 1);
        match &translated.request.input[0] {
            openai::InputItem::Message { role, content } => {
                assert_eq!(role, "user");
                match content {
                    openai::MessageContent::Text(text) => assert_eq!(text, "Hello"),
                    _ => panic!("expected plain text content"),
                }
            }
            _ => panic!("expected a message item"),
        }
    }

    #[test]
    fn max_tokens_is_floored() {
        let request = base_request(vec![user_text("hi")]);
        let conversation = Conversation::default();

        let translated = translate_request(&request, &conversation, "gpt-4.1").unwrap();
        assert_eq!(translated.request.max_output_tokens, MAX_OUTPUT_TOKENS_FLOOR);
    }

    #[test]
    fn tool_use_mints_call_id_and_drops_unpaired_output() {
        let message = anthropic::InputMessage {
            role: anthropic::Role::Assistant,
            content: anthropic::InputMessageContent::Items(vec![anthropic::InputContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "calc".to_string(),
                input: json!({"x": 1}),
                unknown_fields: Default::default(),
            }]),
            unknown_fields: Default::default(),
        };
        let request = base_request(vec![message]);
        let conversation = Conversation::default();

        let translated = translate_request(&request, &conversation, "gpt-4.1").unwrap();

        // Unpaired function_call is dropped by the post-filter.
        assert!(translated.request.input.is_empty());
        assert_eq!(translated.new_bindings.len(), 1);
        assert_eq!(translated.new_bindings[0].1.tool_use_id, "toolu_1");
    }

    #[test]
    fn paired_function_call_and_output_both_survive() {
        let message = anthropic::InputMessage {
            role: anthropic::Role::Assistant,
            content: anthropic::InputMessageContent::Items(vec![anthropic::InputContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "calc".to_string(),
                input: json!({}),
                unknown_fields: Default::default(),
            }]),
            unknown_fields: Default::default(),
        };
        let result_message = anthropic::InputMessage {
            role: anthropic::Role::User,
            content: anthropic::InputMessageContent::Items(vec![anthropic::InputContentBlock::ToolResult {
                tool_use_id: "toolu_1".to_string(),
                content: Some(anthropic::ToolResultContent::Text("42".to_string())),
                is_error: None,
                unknown_fields: Default::default(),
            }]),
            unknown_fields: Default::default(),
        };
        let request = base_request(vec![message, result_message]);
        let conversation = Conversation::default();

        let translated = translate_request(&request, &conversation, "gpt-4.1").unwrap();

        assert_eq!(translated.request.input.len(), 2);
        assert!(translated.request.input[0].is_function_call());
        assert!(translated.request.input[1].is_function_call_output());
    }

    #[test]
    fn web_search_tool_always_present() {
        let request = base_request(vec![user_text("hi")]);
        let conversation = Conversation::default();

        let translated = translate_request(&request, &conversation, "gpt-4.1").unwrap();
        assert!(translated.request.tools.iter().any(|tool| tool.kind == "web_search"));
    }

    #[test]
    fn builtin_bash_tool_maps_to_canonical_function() {
        let mut request = base_request(vec![user_text("hi")]);
        request.tools = Some(vec![anthropic::Tool {
            name: "bash".to_string(),
            description: None,
            input_schema: None,
            kind: Some("bash_20250124".to_string()),
            unknown_fields: Default::default(),
        }]);
        let conversation = Conversation::default();

        let translated = translate_request(&request, &conversation, "gpt-4.1").unwrap();
        assert!(
            translated
                .request
                .tools
                .iter()
                .any(|tool| tool.kind == "function" && tool.name.as_deref() == Some("bash"))
        );
    }

    #[test]
    fn builtin_web_search_tool_does_not_duplicate_the_unconditional_one() {
        let mut request = base_request(vec![user_text("hi")]);
        request.tools = Some(vec![anthropic::Tool {
            name: "web_search".to_string(),
            description: None,
            input_schema: None,
            kind: Some("web_search_20250305".to_string()),
            unknown_fields: Default::default(),
        }]);
        let conversation = Conversation::default();

        let translated = translate_request(&request, &conversation, "gpt-4.1").unwrap();
        assert_eq!(translated.request.tools.iter().filter(|t| t.kind == "web_search").count(), 1);
    }

    #[test]
    fn unknown_builtin_tool_is_dropped() {
        let mut request = base_request(vec![user_text("hi")]);
        request.tools = Some(vec![anthropic::Tool {
            name: "mystery".to_string(),
            description: None,
            input_schema: None,
            kind: Some("mystery_tool_v1".to_string()),
            unknown_fields: Default::default(),
        }]);
        let conversation = Conversation::default();

        let translated = translate_request(&request, &conversation, "gpt-4.1").unwrap();
        assert!(!translated.request.tools.iter().any(|tool| tool.name.as_deref() == Some("mystery")));
    }
}
