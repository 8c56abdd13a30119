//! Scripted LLM for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;
use crate::llm::{LlmClient, LlmResponse, ToolSpec};
use crate::message::{Message, ToolCall};

/// Test double with FIFO scripts for completions and structured calls.
///
/// An exhausted completion script yields an empty assistant reply; an
/// exhausted structured script is an error, since pipelines must consume
/// exactly what the test queued.
#[derive(Default)]
pub struct MockLlm {
    responses: Mutex<Vec<LlmResponse>>,
    structured: Mutex<Vec<Result<Value, AgentError>>>,
    /// Prompts seen by invoke/invoke_structured, for assertions.
    pub prompts: Mutex<Vec<String>>,
    /// Tool names bound on each invoke, for assertions on mode binding.
    pub tool_bindings: Mutex<Vec<Vec<String>>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a plain-text assistant reply.
    pub fn push_text(&self, content: impl Into<String>) {
        self.responses.lock().unwrap().push(LlmResponse {
            content: content.into(),
            tool_calls: vec![],
        });
    }

    /// Queues an assistant reply that calls one tool.
    pub fn push_tool_call(&self, id: &str, name: &str, arguments: Value) {
        self.responses.lock().unwrap().push(LlmResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            }],
        });
    }

    /// Queues a structured-output value.
    pub fn push_structured(&self, value: Value) {
        self.structured.lock().unwrap().push(Ok(value));
    }

    /// Queues a structured-output failure.
    pub fn push_structured_error(&self, error: AgentError) {
        self.structured.lock().unwrap().push(Err(error));
    }

    fn record_prompt(&self, messages: &[Message]) {
        let rendered = messages
            .iter()
            .map(Message::content)
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(rendered);
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, AgentError> {
        self.record_prompt(messages);
        self.tool_bindings
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(LlmResponse {
                content: String::new(),
                tool_calls: vec![],
            });
        }
        Ok(responses.remove(0))
    }

    async fn invoke_structured(
        &self,
        messages: &[Message],
        schema_name: &str,
        _schema: &Value,
    ) -> Result<Value, AgentError> {
        self.record_prompt(messages);
        let mut structured = self.structured.lock().unwrap();
        if structured.is_empty() {
            return Err(AgentError::StructuredOutput(format!(
                "mock has no scripted value for {schema_name}"
            )));
        }
        structured.remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: scripted responses come back in FIFO order.
    #[tokio::test]
    async fn scripted_fifo() {
        let llm = MockLlm::new();
        llm.push_tool_call("c1", "query_tool", json!({"question": "q"}));
        llm.push_text("final answer");

        let first = llm.invoke(&[Message::human("q")], &[]).await.unwrap();
        assert_eq!(first.tool_calls[0].name, "query_tool");
        let second = llm.invoke(&[], &[]).await.unwrap();
        assert_eq!(second.content, "final answer");
        // Script exhausted: empty reply, not an error.
        assert!(llm.invoke(&[], &[]).await.unwrap().content.is_empty());
    }

    /// **Scenario**: structured script exhaustion is an error.
    #[tokio::test]
    async fn structured_exhaustion_errors() {
        let llm = MockLlm::new();
        llm.push_structured(json!({"query_type": "reject"}));
        assert!(llm
            .invoke_structured(&[], "classification", &json!({}))
            .await
            .is_ok());
        assert!(llm
            .invoke_structured(&[], "classification", &json!({}))
            .await
            .is_err());
    }
}
