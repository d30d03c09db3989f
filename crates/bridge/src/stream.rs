//! Stream Translator (C5): the state machine that turns one upstream
//! `responses` event stream into a well-formed downstream Messages-API event
//! stream — opening and closing content blocks in order, keeping indices
//! paired, and buffering tool-call arguments as `input_json_delta` chunks.

use serde_json::json;
use uuid::Uuid;

use crate::{
    correlation::ToolBinding,
    protocol::{
        anthropic::{
            self,
            sse::{ContentBlockStart, ContentDelta, MessageDelta, StreamEvent as DownstreamEvent, StreamMessageStart},
        },
        openai::{self, StreamEvent as UpstreamEvent},
    },
};

/// Something the translator wants emitted. Typed events and the untyped
/// ping frame are distinct at the wire level, so they stay distinct
/// here rather than folding `ping` into [`DownstreamEvent`].
pub enum Emission {
    Event(DownstreamEvent),
    Ping,
}

impl From<DownstreamEvent> for Emission {
    fn from(event: DownstreamEvent) -> Self {
        Emission::Event(event)
    }
}

impl Emission {
    /// Drives the emitter with this emission's typed-event or ping write.
    pub fn send<S: crate::sse_emitter::EventSink>(&self, emitter: &crate::sse_emitter::SseEmitter<S>) {
        match self {
            Emission::Event(event) => emitter.send_event(event),
            Emission::Ping => emitter.send_ping(),
        }
    }
}

struct PendingCall {
    item_id: String,
    call_id: String,
    name: String,
    tool_use_id: String,
    index: u32,
}

struct WebSearchBlock {
    index: u32,
    tool_use_id: String,
    sequence: u32,
}

pub struct StreamTranslator {
    message_id: String,
    model: String,
    next_index: u32,
    greeted: bool,
    completed: bool,
    text_block: Option<u32>,
    pending_calls: Vec<PendingCall>,
    web_search: Option<WebSearchBlock>,
    new_bindings: Vec<(String, ToolBinding)>,
    usage: anthropic::Usage,
    saw_tool_block: bool,
    last_response_id: Option<String>,
}

impl StreamTranslator {
    pub fn new(message_id: String, model: String) -> Self {
        Self {
            message_id,
            model,
            next_index: 0,
            greeted: false,
            completed: false,
            text_block: None,
            pending_calls: Vec::new(),
            web_search: None,
            new_bindings: Vec::new(),
            usage: anthropic::Usage::default(),
            saw_tool_block: false,
            last_response_id: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Bindings minted and the upstream response id observed this turn,
    /// handed to the coordinator once the session ends so it can update the
    /// correlation store.
    pub fn into_parts(self) -> (Vec<(String, ToolBinding)>, Option<String>) {
        (self.new_bindings, self.last_response_id)
    }

    /// Emits `message_start` followed by one `ping`. Idempotent: calling it
    /// more than once after the first has no further effect.
    pub fn greet(&mut self) -> Vec<Emission> {
        if self.greeted {
            return Vec::new();
        }
        self.greeted = true;

        vec![
            DownstreamEvent::MessageStart {
                message: StreamMessageStart::new(self.message_id.clone(), self.model.clone()),
            }
            .into(),
            Emission::Ping,
        ]
    }

    /// Translates one upstream event into zero or more emissions, in order.
    pub fn handle_event(&mut self, event: UpstreamEvent) -> Vec<Emission> {
        if self.completed {
            log::warn!("dropping upstream event received after session completion");
            return Vec::new();
        }

        match event {
            UpstreamEvent::ResponseCreated { response } => self.on_response_created(response),
            UpstreamEvent::ResponseInProgress => vec![Emission::Ping],
            UpstreamEvent::OutputTextDelta { delta } => self.on_text_delta(delta),
            UpstreamEvent::OutputTextDone => self.close_text_block(),
            UpstreamEvent::OutputItemAdded { item } => self.on_output_item_added(item),
            UpstreamEvent::OutputItemDone { item } => self.on_output_item_done(item),
            UpstreamEvent::FunctionCallArgumentsDelta { item_id, delta } => {
                self.on_function_call_arguments_delta(item_id, delta)
            }
            UpstreamEvent::FunctionCallArgumentsDone { .. } => Vec::new(),
            UpstreamEvent::ContentPartAdded { part } => self.on_content_part_added(part),
            UpstreamEvent::ContentPartDone { part } => self.on_content_part_done(part),
            UpstreamEvent::WebSearchCallInProgress => self.on_web_search_in_progress(),
            UpstreamEvent::WebSearchCallSearching => self.on_web_search_searching(),
            UpstreamEvent::WebSearchCallCompleted => self.on_web_search_completed(),
            UpstreamEvent::ResponseFailed => self.terminate_with_error("upstream response failed"),
            UpstreamEvent::ResponseIncomplete => self.terminate_with_error("upstream response incomplete"),
            UpstreamEvent::Error => self.terminate_with_error("upstream stream reported an error"),
            UpstreamEvent::ResponseCompleted { response } => self.on_response_completed(response),
            UpstreamEvent::Unknown => {
                log::debug!("ignoring unrecognized upstream stream event");
                Vec::new()
            }
        }
    }

    fn on_response_created(&mut self, response: openai::ResponseIdentity) -> Vec<Emission> {
        self.last_response_id = Some(response.id);

        let index = self.open_index();
        self.text_block = Some(index);

        vec![DownstreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlockStart::Text { text: String::new() },
        }
        .into()]
    }

    fn on_text_delta(&mut self, delta: String) -> Vec<Emission> {
        let mut out = Vec::new();

        let index = match self.text_block {
            Some(index) => index,
            None => {
                let index = self.open_index();
                self.text_block = Some(index);
                out.push(Emission::Event(DownstreamEvent::ContentBlockStart {
                    index,
                    content_block: ContentBlockStart::Text { text: String::new() },
                }));
                index
            }
        };

        out.push(Emission::Event(DownstreamEvent::ContentBlockDelta {
            index,
            delta: ContentDelta::TextDelta { text: delta },
        }));

        out
    }

    fn close_text_block(&mut self) -> Vec<Emission> {
        match self.text_block.take() {
            Some(index) => vec![DownstreamEvent::ContentBlockStop { index }.into()],
            None => Vec::new(),
        }
    }

    fn on_content_part_added(&mut self, part: Option<openai::OutputContentPart>) -> Vec<Emission> {
        let _ = part;
        // A text block is already open from `response.created` in the common
        // case; never double-open one while it's still current (see the
        // open question this resolves in the design ledger).
        if self.text_block.is_some() {
            return Vec::new();
        }

        let index = self.open_index();
        self.text_block = Some(index);
        vec![DownstreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlockStart::Text { text: String::new() },
        }
        .into()]
    }

    fn on_content_part_done(&mut self, part: Option<openai::OutputContentPart>) -> Vec<Emission> {
        let Some(index) = self.text_block else {
            return Vec::new();
        };

        let mut out = Vec::new();

        if let Some(openai::OutputContentPart::OutputText { text }) = part {
            out.push(Emission::Event(DownstreamEvent::ContentBlockDelta {
                index,
                delta: ContentDelta::TextDelta { text },
            }));
        }

        self.text_block = None;
        out.push(Emission::Event(DownstreamEvent::ContentBlockStop { index }));
        out
    }

    fn on_output_item_added(&mut self, item: openai::OutputItem) -> Vec<Emission> {
        let openai::OutputItem::FunctionCall { id, call_id, name, .. } = item else {
            return Vec::new();
        };

        let tool_use_id = format!("toolu_{}", Uuid::new_v4().simple());
        let index = self.open_index();
        self.saw_tool_block = true;

        let event = DownstreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlockStart::ToolUse {
                id: tool_use_id.clone(),
                name: name.clone(),
                input: json!({}),
            },
        };

        self.pending_calls.push(PendingCall {
            item_id: id,
            call_id,
            name,
            tool_use_id,
            index,
        });

        vec![event.into()]
    }

    fn on_function_call_arguments_delta(&mut self, item_id: String, delta: String) -> Vec<Emission> {
        let Some(pending) = self.pending_calls.iter().find(|p| p.item_id == item_id) else {
            log::warn!("function_call_arguments.delta for unknown item_id {item_id}");
            return Vec::new();
        };

        vec![DownstreamEvent::ContentBlockDelta {
            index: pending.index,
            delta: ContentDelta::InputJsonDelta { partial_json: delta },
        }
        .into()]
    }

    fn on_output_item_done(&mut self, item: openai::OutputItem) -> Vec<Emission> {
        let openai::OutputItem::FunctionCall { id, .. } = item else {
            return Vec::new();
        };

        let Some(pos) = self.pending_calls.iter().position(|p| p.item_id == id) else {
            return Vec::new();
        };
        let pending = self.pending_calls.remove(pos);

        self.new_bindings.push((
            pending.call_id,
            ToolBinding {
                tool_use_id: pending.tool_use_id,
                name: pending.name,
            },
        ));

        vec![DownstreamEvent::ContentBlockStop { index: pending.index }.into()]
    }

    fn on_web_search_in_progress(&mut self) -> Vec<Emission> {
        let tool_use_id = format!("toolu_{}", Uuid::new_v4().simple());
        let index = self.open_index();
        self.saw_tool_block = true;

        self.web_search = Some(WebSearchBlock {
            index,
            tool_use_id: tool_use_id.clone(),
            sequence: 0,
        });

        vec![DownstreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlockStart::ToolUse {
                id: tool_use_id,
                name: "web_search".to_string(),
                input: json!({"status": "in_progress"}),
            },
        }
        .into()]
    }

    fn on_web_search_searching(&mut self) -> Vec<Emission> {
        let Some(block) = self.web_search.as_mut() else {
            return Vec::new();
        };
        block.sequence += 1;

        let partial_json = json!({"status": "searching", "sequence": block.sequence}).to_string();

        vec![DownstreamEvent::ContentBlockDelta {
            index: block.index,
            delta: ContentDelta::InputJsonDelta { partial_json },
        }
        .into()]
    }

    fn on_web_search_completed(&mut self) -> Vec<Emission> {
        let Some(block) = self.web_search.take() else {
            return Vec::new();
        };

        vec![DownstreamEvent::ContentBlockStop { index: block.index }.into()]
    }

    fn on_response_completed(&mut self, response: openai::Response) -> Vec<Emission> {
        let mut out = self.close_all_open_blocks();

        self.last_response_id = Some(response.id.clone());

        if let Some(usage) = &response.usage {
            self.usage = anthropic::Usage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            };
        }

        let stop_reason = if response
            .incomplete_details
            .as_ref()
            .is_some_and(|details| details.reason == "max_output_tokens")
        {
            anthropic::StopReason::MaxTokens
        } else if self.saw_tool_block {
            anthropic::StopReason::ToolUse
        } else {
            anthropic::StopReason::EndTurn
        };

        out.push(Emission::Event(DownstreamEvent::MessageDelta {
            delta: MessageDelta {
                stop_reason,
                stop_sequence: None,
            },
            usage: self.usage,
        }));
        out.push(Emission::Event(DownstreamEvent::MessageStop));

        self.completed = true;
        out
    }

    fn terminate_with_error(&mut self, message: &str) -> Vec<Emission> {
        let mut out = self.close_all_open_blocks();
        out.push(Emission::Event(DownstreamEvent::Error {
            error: anthropic::ErrorBody::api_error(message),
        }));
        out.push(Emission::Event(DownstreamEvent::MessageStop));
        self.completed = true;
        out
    }

    fn open_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// Closes every block still open, in ascending index order, per the
    /// `response.completed` table row. Used by every termination path so a
    /// stray open block never survives past `message_stop`.
    fn close_all_open_blocks(&mut self) -> Vec<Emission> {
        let mut open_indices: Vec<u32> = self.pending_calls.iter().map(|p| p.index).collect();
        open_indices.extend(self.text_block);
        open_indices.extend(self.web_search.as_ref().map(|b| b.index));
        open_indices.sort_unstable();

        self.text_block = None;
        self.pending_calls.clear();
        self.web_search = None;

        open_indices
            .into_iter()
            .map(|index| Emission::Event(DownstreamEvent::ContentBlockStop { index }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> StreamTranslator {
        StreamTranslator::new("msg_1".to_string(), "gpt-4.1".to_string())
    }

    fn events_only(emissions: Vec<Emission>) -> Vec<DownstreamEvent> {
        emissions
            .into_iter()
            .filter_map(|e| match e {
                Emission::Event(event) => Some(event),
                Emission::Ping => None,
            })
            .collect()
    }

    #[test]
    fn greet_emits_message_start_and_ping_once() {
        let mut t = translator();
        let first = t.greet();
        assert_eq!(first.len(), 2);
        assert!(matches!(first[0], Emission::Event(DownstreamEvent::MessageStart { .. })));
        assert!(matches!(first[1], Emission::Ping));

        assert!(t.greet().is_empty());
    }

    #[test]
    fn response_created_opens_text_block_at_index_zero() {
        let mut t = translator();
        let events = events_only(t.handle_event(UpstreamEvent::ResponseCreated {
            response: openai::ResponseIdentity { id: "resp_1".to_string() },
        }));

        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            DownstreamEvent::ContentBlockStart { index: 0, content_block: ContentBlockStart::Text { .. } }
        ));
    }

    #[test]
    fn plain_turn_scenario_a() {
        let mut t = translator();
        t.handle_event(UpstreamEvent::ResponseCreated {
            response: openai::ResponseIdentity { id: "resp_1".to_string() },
        });

        let delta1 = events_only(t.handle_event(UpstreamEvent::OutputTextDelta { delta: "Hi".to_string() }));
        assert_eq!(delta1.len(), 1);
        assert!(matches!(delta1[0], DownstreamEvent::ContentBlockDelta { index: 0, .. }));

        let delta2 = events_only(t.handle_event(UpstreamEvent::OutputTextDelta { delta: " there".to_string() }));
        assert_eq!(delta2.len(), 1);

        let done = events_only(t.handle_event(UpstreamEvent::OutputTextDone));
        assert!(matches!(done[0], DownstreamEvent::ContentBlockStop { index: 0 }));

        let completed = events_only(t.handle_event(UpstreamEvent::ResponseCompleted {
            response: openai::Response {
                id: "resp_1".to_string(),
                status: Some("completed".to_string()),
                incomplete_details: None,
                output: Vec::new(),
                usage: None,
            },
        }));

        assert_eq!(completed.len(), 2);
        match &completed[0] {
            DownstreamEvent::MessageDelta { delta, .. } => assert_eq!(delta.stop_reason, anthropic::StopReason::EndTurn),
            _ => panic!("expected message_delta"),
        }
        assert!(matches!(completed[1], DownstreamEvent::MessageStop));
        assert!(t.is_completed());
    }

    #[test]
    fn tool_turn_scenario_b_closes_tool_block_then_text_block() {
        let mut t = translator();
        t.handle_event(UpstreamEvent::ResponseCreated {
            response: openai::ResponseIdentity { id: "resp_1".to_string() },
        });

        let added = events_only(t.handle_event(UpstreamEvent::OutputItemAdded {
            item: openai::OutputItem::FunctionCall {
                id: "f1".to_string(),
                call_id: "c1".to_string(),
                name: "calc".to_string(),
                arguments: String::new(),
            },
        }));
        let minted_tool_use_id = match &added[0] {
            DownstreamEvent::ContentBlockStart { index: 1, content_block: ContentBlockStart::ToolUse { id, .. } } => {
                id.clone()
            }
            _ => panic!("expected tool_use content_block_start at index 1"),
        };
        assert!(minted_tool_use_id.starts_with("toolu_"));

        let delta1 = events_only(t.handle_event(UpstreamEvent::FunctionCallArgumentsDelta {
            item_id: "f1".to_string(),
            delta: "{\"x\":1".to_string(),
        }));
        assert!(matches!(delta1[0], DownstreamEvent::ContentBlockDelta { index: 1, .. }));

        let delta2 = events_only(t.handle_event(UpstreamEvent::FunctionCallArgumentsDelta {
            item_id: "f1".to_string(),
            delta: ",\"y\":2}".to_string(),
        }));
        assert!(matches!(delta2[0], DownstreamEvent::ContentBlockDelta { index: 1, .. }));

        let done = events_only(t.handle_event(UpstreamEvent::OutputItemDone {
            item: openai::OutputItem::FunctionCall {
                id: "f1".to_string(),
                call_id: "c1".to_string(),
                name: "calc".to_string(),
                arguments: "{\"x\":1,\"y\":2}".to_string(),
            },
        }));
        assert!(matches!(done[0], DownstreamEvent::ContentBlockStop { index: 1 }));

        let completed = events_only(t.handle_event(UpstreamEvent::ResponseCompleted {
            response: openai::Response {
                id: "resp_1".to_string(),
                status: Some("completed".to_string()),
                incomplete_details: None,
                output: Vec::new(),
                usage: None,
            },
        }));

        // Still-open text block (index 0) closes as part of response.completed.
        assert!(matches!(completed[0], DownstreamEvent::ContentBlockStop { index: 0 }));
        match &completed[1] {
            DownstreamEvent::MessageDelta { delta, .. } => assert_eq!(delta.stop_reason, anthropic::StopReason::ToolUse),
            _ => panic!("expected message_delta"),
        }
        assert!(matches!(completed[2], DownstreamEvent::MessageStop));

        let (bindings, last_response_id) = t.into_parts();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].0, "c1");
        assert_eq!(bindings[0].1.tool_use_id, minted_tool_use_id);
        assert_eq!(bindings[0].1.name, "calc");
        assert_eq!(last_response_id.as_deref(), Some("resp_1"));
    }

    #[test]
    fn max_tokens_scenario_d() {
        let mut t = translator();
        t.handle_event(UpstreamEvent::ResponseCreated {
            response: openai::ResponseIdentity { id: "resp_1".to_string() },
        });

        let completed = events_only(t.handle_event(UpstreamEvent::ResponseCompleted {
            response: openai::Response {
                id: "resp_1".to_string(),
                status: Some("incomplete".to_string()),
                incomplete_details: Some(openai::IncompleteDetails {
                    reason: "max_output_tokens".to_string(),
                }),
                output: Vec::new(),
                usage: None,
            },
        }));

        match &completed[1] {
            DownstreamEvent::MessageDelta { delta, .. } => assert_eq!(delta.stop_reason, anthropic::StopReason::MaxTokens),
            _ => panic!("expected message_delta"),
        }
    }

    #[test]
    fn events_after_completion_are_dropped() {
        let mut t = translator();
        t.handle_event(UpstreamEvent::ResponseCompleted {
            response: openai::Response {
                id: "resp_1".to_string(),
                status: Some("completed".to_string()),
                incomplete_details: None,
                output: Vec::new(),
                usage: None,
            },
        });
        assert!(t.is_completed());

        let after = t.handle_event(UpstreamEvent::OutputTextDelta { delta: "late".to_string() });
        assert!(after.is_empty());
    }

    #[test]
    fn response_failed_emits_error_then_message_stop() {
        let mut t = translator();
        let events = events_only(t.handle_event(UpstreamEvent::ResponseFailed));

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DownstreamEvent::Error { .. }));
        assert!(matches!(events[1], DownstreamEvent::MessageStop));
        assert!(t.is_completed());
    }

    #[test]
    fn web_search_lifecycle_opens_and_closes_a_tool_use_block() {
        let mut t = translator();
        t.handle_event(UpstreamEvent::ResponseCreated {
            response: openai::ResponseIdentity { id: "resp_1".to_string() },
        });

        let added = events_only(t.handle_event(UpstreamEvent::WebSearchCallInProgress));
        assert!(matches!(
            added[0],
            DownstreamEvent::ContentBlockStart { index: 1, content_block: ContentBlockStart::ToolUse { .. } }
        ));

        let searching = events_only(t.handle_event(UpstreamEvent::WebSearchCallSearching));
        assert!(matches!(searching[0], DownstreamEvent::ContentBlockDelta { index: 1, .. }));

        let done = events_only(t.handle_event(UpstreamEvent::WebSearchCallCompleted));
        assert!(matches!(done[0], DownstreamEvent::ContentBlockStop { index: 1 }));
    }
}
