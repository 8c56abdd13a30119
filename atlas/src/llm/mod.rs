//! LLM client abstraction.
//!
//! The agent node and the pipelines depend on [`LlmClient`]: plain
//! completions with optional tool binding (`invoke` / `invoke_stream`) and
//! schema-constrained structured output (`invoke_structured`, realized as a
//! forced single-tool call). Implementations: [`ChatOpenAI`] (real API),
//! [`MockLlm`] (scripted, for tests).

mod mock;
mod openai;

pub use mock::MockLlm;
pub use openai::ChatOpenAI;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::message::{Message, ToolCall};
use crate::stream::MessageChunk;

/// A tool the model may call: name, description, and JSON-schema parameters.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Response from one completion: assistant text and any tool calls.
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// LLM client: given messages (and optionally tools), returns assistant text
/// and tool calls.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One completion turn. `tools` may be empty (plain text reply).
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec])
        -> Result<LlmResponse, AgentError>;

    /// Streaming variant: when `chunk_tx` is set, implementations send
    /// content tokens as they arrive, then return the complete response.
    ///
    /// Default implementation calls `invoke` and sends the full content as
    /// one chunk.
    async fn invoke_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, AgentError> {
        let response = self.invoke(messages, tools).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx
                    .send(MessageChunk {
                        content: response.content.clone(),
                    })
                    .await;
            }
        }
        Ok(response)
    }

    /// Structured output: the model is forced to call a single tool named
    /// `schema_name` whose parameters are `schema`; the returned value is the
    /// parsed arguments object. Call sites deserialize into their typed
    /// structs and validate.
    async fn invoke_structured(
        &self,
        messages: &[Message],
        schema_name: &str,
        schema: &Value,
    ) -> Result<Value, AgentError>;
}
