//! Chat stream event: wire shape for one SSE frame.

use serde::Serialize;
use serde_json::{json, Value};

/// Envelope for message-style events.
#[derive(Clone, Debug, Serialize)]
pub struct StreamPayload {
    pub source: String,
    pub content: String,
    pub message_type: String,
}

/// One event on the chat stream.
///
/// Ordering contract within a turn: `ThreadId` precedes everything, `Done`
/// succeeds everything, and a `NodeStart` for node N precedes any
/// `PipelineState` produced by N.
#[derive(Clone, Debug)]
pub enum ChatEvent {
    /// First event: the conversation thread id.
    ThreadId { thread_id: String },
    /// Token chunk of the final answer.
    AgentTalk { source: String, content: String },
    /// The agent decided to call a tool.
    ToolCall { source: String, content: String },
    /// Raw tool message content.
    ToolOutput { source: String, content: String },
    /// A pipeline node began; payload surfaced verbatim.
    NodeStart { payload: Value },
    /// State projection from a just-completed pipeline node; verbatim.
    PipelineState { payload: Value },
    /// Last event, with aggregate stats.
    Done { payload: Value },
}

impl ChatEvent {
    pub fn agent_talk(content: impl Into<String>) -> Self {
        ChatEvent::AgentTalk {
            source: "agent".into(),
            content: content.into(),
        }
    }

    pub fn tool_call(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        ChatEvent::ToolCall {
            source: tool_name.into(),
            content: content.into(),
        }
    }

    pub fn tool_output(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        ChatEvent::ToolOutput {
            source: tool_name.into(),
            content: content.into(),
        }
    }

    pub fn node_start(node: impl Into<String>) -> Self {
        ChatEvent::NodeStart {
            payload: json!({ "node": node.into() }),
        }
    }

    /// SSE `event:` name.
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::ThreadId { .. } => "thread_id",
            ChatEvent::AgentTalk { .. } => "agent_talk",
            ChatEvent::ToolCall { .. } => "tool_call",
            ChatEvent::ToolOutput { .. } => "tool_output",
            ChatEvent::NodeStart { .. } => "node_start",
            ChatEvent::PipelineState { .. } => "pipeline_state",
            ChatEvent::Done { .. } => "done",
        }
    }

    /// SSE `data:` payload.
    pub fn data(&self) -> Value {
        match self {
            ChatEvent::ThreadId { thread_id } => json!({ "thread_id": thread_id }),
            ChatEvent::AgentTalk { source, content } => wrap(source, content, "agent_talk"),
            ChatEvent::ToolCall { source, content } => wrap(source, content, "tool_call"),
            ChatEvent::ToolOutput { source, content } => wrap(source, content, "tool_output"),
            ChatEvent::NodeStart { payload } | ChatEvent::PipelineState { payload } => {
                payload.clone()
            }
            ChatEvent::Done { payload } => payload.clone(),
        }
    }
}

fn wrap(source: &str, content: &str, message_type: &str) -> Value {
    serde_json::to_value(StreamPayload {
        source: source.to_string(),
        content: content.to_string(),
        message_type: message_type.to_string(),
    })
    .unwrap_or(Value::Null)
}
