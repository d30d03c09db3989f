//! Token counting for `POST /v1/messages/count_tokens`. This rides on an
//! external tokenizer library, same as the rest of the gateway's HTTP
//! surface — not part of the translation core, just a convenience endpoint.

use bridge::protocol::anthropic;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

fn encoder() -> &'static CoreBPE {
    static ENCODER: OnceLock<CoreBPE> = OnceLock::new();
    ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().expect("bundled cl100k_base encoding is always valid"))
}

/// Concatenates the system prompt and every text fragment across all
/// messages, then counts tokens over the result.
pub fn count(request: &anthropic::Request) -> usize {
    let mut text = String::new();

    if let Some(system) = &request.system {
        match system {
            anthropic::SystemPrompt::Text(value) => text.push_str(value),
            anthropic::SystemPrompt::Blocks(blocks) => {
                for block in blocks {
                    text.push_str(&block.text);
                    text.push('\n');
                }
            }
        }
    }

    for message in &request.messages {
        match &message.content {
            anthropic::InputMessageContent::Text(value) => {
                text.push('\n');
                text.push_str(value);
            }
            anthropic::InputMessageContent::Items(blocks) => {
                for block in blocks {
                    if let anthropic::InputContentBlock::Text { text: value, .. } = block {
                        text.push('\n');
                        text.push_str(value);
                    }
                }
            }
        }
    }

    encoder().encode_with_special_tokens(&text).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_tokens_across_system_and_messages() {
        let request = anthropic::Request {
            model: "claude-opus-4".to_string(),
            messages: vec![anthropic::InputMessage {
                role: anthropic::Role::User,
                content: anthropic::InputMessageContent::Text("hello world".to_string()),
                unknown_fields: Default::default(),
            }],
            max_tokens: 1024,
            system: Some(anthropic::SystemPrompt::Text("be nice".to_string())),
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: None,
            metadata: None,
            tools: None,
            tool_choice: None,
            unknown_fields: Default::default(),
        };

        assert!(count(&request) > 0);
    }
}
