//! Wire-level event types for the chat SSE stream.
//!
//! Each event maps to one SSE frame: an `event:` name and a single-line JSON
//! `data:` field. `node_start` and `pipeline_state` payloads are surfaced
//! verbatim; `agent_talk`, `tool_call`, and `tool_output` are wrapped in a
//! `{source, content, message_type}` envelope.

mod event;

pub use event::{ChatEvent, StreamPayload};
