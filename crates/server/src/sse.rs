//! Bridges [`bridge::sse_emitter::EventSink`] onto an axum streaming
//! response body. A write fails (returns `false`) once the receiving half —
//! the HTTP body the client is reading — has gone away, which is exactly
//! the transport-closed signal a dropped body implies.

use axum::body::{Body, Bytes};
use bridge::sse_emitter::EventSink;
use futures::{stream, StreamExt as _};
use std::convert::Infallible;
use tokio::sync::mpsc;

pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl EventSink for ChannelSink {
    fn write(&self, chunk: String) -> bool {
        self.tx.send(chunk).is_ok()
    }
}

/// Builds a connected (sink, body) pair: frames pushed through the sink
/// appear on the body's byte stream in order, and stop appearing the moment
/// the body is dropped (client disconnected or response finished).
pub fn channel() -> (ChannelSink, Body) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let byte_stream = stream::poll_fn(move |cx| rx.poll_recv(cx)).map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk)));
    (ChannelSink { tx }, Body::from_stream(byte_stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_succeeds_while_the_body_is_alive() {
        let (sink, body) = channel();
        assert!(sink.write("data: hi\n\n".to_string()));
        drop(body);
    }

    #[test]
    fn write_fails_once_the_body_is_dropped() {
        let (sink, body) = channel();
        drop(body);
        assert!(!sink.write("data: hi\n\n".to_string()));
    }
}
