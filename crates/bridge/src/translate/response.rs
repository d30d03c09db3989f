//! Response Translator (C3): upstream `responses` object → downstream
//! `Message`, for the non-streaming path.

use serde_json::Value;
use uuid::Uuid;

use crate::{
    correlation::ToolBinding,
    protocol::{anthropic, openai},
};

pub struct Translated {
    pub message: anthropic::Message,
    pub new_bindings: Vec<(String, ToolBinding)>,
}

pub fn translate_response(response: &openai::Response, message_id: String, downstream_model: String) -> Translated {
    let mut content = Vec::new();
    let mut new_bindings = Vec::new();
    let mut text_buffer = String::new();
    let mut saw_function_call = false;

    for item in &response.output {
        match item {
            openai::OutputItem::Message { content: parts } => {
                for part in parts {
                    if let openai::OutputContentPart::OutputText { text } = part {
                        text_buffer.push_str(text);
                    }
                }
            }
            openai::OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => {
                flush_text(&mut text_buffer, &mut content);

                saw_function_call = true;
                let input: Value = serde_json::from_str(arguments).unwrap_or_else(|_| Value::Object(Default::default()));
                let tool_use_id = format!("toolu_{}", Uuid::new_v4().simple());

                content.push(anthropic::ResponseContentBlock::ToolUse {
                    id: tool_use_id.clone(),
                    name: name.clone(),
                    input,
                });

                new_bindings.push((
                    call_id.clone(),
                    ToolBinding {
                        tool_use_id,
                        name: name.clone(),
                    },
                ));
            }
            openai::OutputItem::Other => {}
        }
    }

    flush_text(&mut text_buffer, &mut content);

    let stop_reason = if response
        .incomplete_details
        .as_ref()
        .is_some_and(|details| details.reason == "max_output_tokens")
    {
        anthropic::StopReason::MaxTokens
    } else if saw_function_call {
        anthropic::StopReason::ToolUse
    } else {
        anthropic::StopReason::EndTurn
    };

    let usage = response
        .usage
        .as_ref()
        .map(|usage| anthropic::Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        })
        .unwrap_or_default();

    let message = anthropic::Message {
        id: message_id,
        kind: "message".to_string(),
        role: anthropic::Role::Assistant,
        content,
        model: downstream_model,
        stop_reason: Some(stop_reason),
        stop_sequence: None,
        usage,
    };

    Translated { message, new_bindings }
}

fn flush_text(buffer: &mut String, content: &mut Vec<anthropic::ResponseContentBlock>) {
    if buffer.is_empty() {
        return;
    }

    content.push(anthropic::ResponseContentBlock::Text {
        text: std::mem::take(buffer),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(output: Vec<openai::OutputItem>) -> openai::Response {
        openai::Response {
            id: "resp_1".to_string(),
            status: Some("completed".to_string()),
            incomplete_details: None,
            output,
            usage: Some(openai::ResponseUsage {
                input_tokens: 10,
                output_tokens: 5,
            }),
        }
    }

    #[test]
    fn plain_text_response_becomes_single_text_block() {
        let response = response(vec![openai::OutputItem::Message {
            content: vec![openai::OutputContentPart::OutputText {
                text: "hello there".to_string(),
            }],
        }]);

        let translated = translate_response(&response, "msg_1".to_string(), "claude-opus-4".to_string());

        assert_eq!(translated.message.content.len(), 1);
        assert_eq!(translated.message.stop_reason, Some(anthropic::StopReason::EndTurn));
        match &translated.message.content[0] {
            anthropic::ResponseContentBlock::Text { text } => assert_eq!(text, "hello there"),
            _ => panic!("expected a text block"),
        }
    }

    #[test]
    fn function_call_produces_tool_use_block_and_binding() {
        let response = response(vec![openai::OutputItem::FunctionCall {
            id: "fc_1".to_string(),
            call_id: "call_1".to_string(),
            name: "calc".to_string(),
            arguments: "{\"x\":1}".to_string(),
        }]);

        let translated = translate_response(&response, "msg_1".to_string(), "claude-opus-4".to_string());

        assert_eq!(translated.message.stop_reason, Some(anthropic::StopReason::ToolUse));
        assert_eq!(translated.new_bindings.len(), 1);
        assert_eq!(translated.new_bindings[0].0, "call_1");

        match &translated.message.content[0] {
            anthropic::ResponseContentBlock::ToolUse { name, .. } => assert_eq!(name, "calc"),
            _ => panic!("expected a tool_use block"),
        }
    }

    #[test]
    fn incomplete_max_tokens_maps_to_max_tokens_stop_reason() {
        let mut response = response(vec![]);
        response.incomplete_details = Some(openai::IncompleteDetails {
            reason: "max_output_tokens".to_string(),
        });

        let translated = translate_response(&response, "msg_1".to_string(), "claude-opus-4".to_string());
        assert_eq!(translated.message.stop_reason, Some(anthropic::StopReason::MaxTokens));
    }
}
