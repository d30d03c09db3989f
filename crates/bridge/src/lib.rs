//! Protocol-translation core: Anthropic Messages API requests in, OpenAI
//! Responses API requests out, and back again. Transport-agnostic — nothing
//! in this crate touches a socket.

pub mod correlation;
pub mod error;
pub mod protocol;
pub mod schema;
pub mod sse_emitter;
pub mod stream;
pub mod translate;
pub mod unknown_fields;
