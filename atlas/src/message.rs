//! Conversation message types.
//!
//! `Message` is the tagged union flowing through `AtlasAgentState::messages`.
//! Invariant: every assistant tool call is answered by a `Tool` message with
//! the same id before the next assistant message (see
//! [`unanswered_tool_calls`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id; echoed back in the tool message.
    pub id: String,
    /// Tool name (`query_tool`, `atlas_graphql`, `docs_tool`).
    pub name: String,
    /// Parsed JSON arguments.
    pub arguments: Value,
}

impl ToolCall {
    /// Reads a string argument, defaulting to empty.
    pub fn arg_str(&self, key: &str) -> String {
        self.arguments
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// Conversation message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        content: String,
        tool_call_id: String,
        name: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Message::Human {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            name: name.into(),
        }
    }

    /// Message text content (tool calls excluded).
    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::Human { content }
            | Message::Tool { content, .. } => content,
            Message::Assistant { content, .. } => content,
        }
    }

    /// Tool calls carried by an assistant message; empty otherwise.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Message::Assistant { .. })
    }
}

/// Tool-call ids from the last assistant message that have no matching tool
/// message after it. Empty for a balanced history.
pub fn unanswered_tool_calls(messages: &[Message]) -> Vec<String> {
    let Some(last_assistant) = messages.iter().rposition(Message::is_assistant) else {
        return Vec::new();
    };
    let answered: Vec<&str> = messages[last_assistant + 1..]
        .iter()
        .filter_map(|m| match m {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        })
        .collect();
    messages[last_assistant]
        .tool_calls()
        .iter()
        .filter(|tc| !answered.contains(&tc.id.as_str()))
        .map(|tc| tc.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: messages round-trip through serde (checkpoint payloads).
    #[test]
    fn message_roundtrip_serde() {
        let messages = vec![
            Message::human("top exports of Brazil"),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: "call_1".into(),
                    name: "query_tool".into(),
                    arguments: json!({"question": "top exports of Brazil"}),
                }],
            ),
            Message::tool("rows...", "call_1", "query_tool"),
            Message::assistant("Brazil mostly exports soybeans."),
        ];
        let encoded = serde_json::to_string(&messages).unwrap();
        let decoded: Vec<Message> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(messages, decoded);
    }

    /// **Scenario**: tool-call balance detection finds dangling ids.
    #[test]
    fn unanswered_tool_calls_detects_dangling() {
        let mut messages = vec![Message::assistant_with_tool_calls(
            "",
            vec![
                ToolCall {
                    id: "a".into(),
                    name: "query_tool".into(),
                    arguments: json!({}),
                },
                ToolCall {
                    id: "b".into(),
                    name: "query_tool".into(),
                    arguments: json!({}),
                },
            ],
        )];
        assert_eq!(unanswered_tool_calls(&messages), vec!["a", "b"]);
        messages.push(Message::tool("ok", "a", "query_tool"));
        assert_eq!(unanswered_tool_calls(&messages), vec!["b"]);
        messages.push(Message::tool("stub", "b", "query_tool"));
        assert!(unanswered_tool_calls(&messages).is_empty());
    }
}
