//! SSE Emitter (C4): turns downstream [`StreamEvent`]s into wire-format SSE
//! chunks and writes them through a caller-supplied sink, guaranteeing writes
//! stay ordered and going silent once the transport is gone.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use crate::protocol::anthropic::sse::StreamEvent;

/// Abstraction over the actual HTTP response body. Implemented in the server
/// crate over whatever channel feeds the axum streaming body; kept generic
/// here so this crate stays transport-agnostic.
pub trait EventSink: Send + Sync {
    /// Writes a raw chunk. Returns `false` once the transport has gone away,
    /// after which the emitter stops calling back.
    fn write(&self, chunk: String) -> bool;
}

/// A single empty `data:` line, carrying no event name or payload.
pub const PING_CHUNK: &str = "data: \n\n";

pub struct SseEmitter<S: EventSink> {
    sink: S,
    closed: AtomicBool,
    // Serializes writes so two concurrent callers (event push + ping timer)
    // can never interleave two chunks on the wire.
    write_lock: Mutex<()>,
}

impl<S: EventSink> SseEmitter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            closed: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn send_event(&self, event: &StreamEvent) {
        self.write(format_event(event));
    }

    pub fn send_ping(&self) {
        self.write(PING_CHUNK.to_string());
    }

    fn write(&self, chunk: String) {
        if self.is_closed() {
            return;
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.is_closed() {
            return;
        }

        if !self.sink.write(chunk) {
            self.closed.store(true, Ordering::Release);
        }
    }
}

/// Renders a single SSE frame: `event: <name>\ndata: <json>\n\n`.
pub fn format_event(event: &StreamEvent) -> String {
    let name = event_name(event);
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("event: {name}\ndata: {data}\n\n")
}

fn event_name(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::MessageStart { .. } => "message_start",
        StreamEvent::ContentBlockStart { .. } => "content_block_start",
        StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
        StreamEvent::ContentBlockStop { .. } => "content_block_stop",
        StreamEvent::MessageDelta { .. } => "message_delta",
        StreamEvent::MessageStop => "message_stop",
        StreamEvent::Error { .. } => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct RecordingSink {
        chunks: Mutex<Vec<String>>,
        refuse_after: AtomicUsize,
        writes: AtomicUsize,
    }

    impl RecordingSink {
        fn new(refuse_after: usize) -> Self {
            Self {
                chunks: Mutex::new(Vec::new()),
                refuse_after: AtomicUsize::new(refuse_after),
                writes: AtomicUsize::new(0),
            }
        }
    }

    impl EventSink for RecordingSink {
        fn write(&self, chunk: String) -> bool {
            let n = self.writes.fetch_add(1, Ordering::SeqCst);
            if n >= self.refuse_after.load(Ordering::SeqCst) {
                return false;
            }
            self.chunks.lock().unwrap().push(chunk);
            true
        }
    }

    #[test]
    fn message_stop_has_no_payload_fields() {
        let chunk = format_event(&StreamEvent::MessageStop);
        assert_eq!(chunk, "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    }

    #[test]
    fn ping_chunk_has_no_event_name() {
        assert_eq!(PING_CHUNK, "data: \n\n");
        assert!(!PING_CHUNK.contains("event:"));
    }

    #[test]
    fn stops_writing_after_sink_reports_closed() {
        let emitter = SseEmitter::new(RecordingSink::new(1));

        emitter.send_event(&StreamEvent::MessageStop);
        assert!(!emitter.is_closed());

        emitter.send_event(&StreamEvent::MessageStop);
        assert!(emitter.is_closed());

        emitter.send_event(&StreamEvent::MessageStop);
        assert_eq!(emitter.sink.writes.load(Ordering::SeqCst), 2);
    }
}
