//! OpenAI Chat Completions client implementing `LlmClient`.
//!
//! Tool calling maps [`ToolSpec`]s onto Chat Completions function tools;
//! structured output is a single forced tool whose parameters are the target
//! schema. Streaming reads `choices[0].delta.content` for incremental text
//! and accumulates tool-call deltas by index.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::debug;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessage,
        ChatCompletionRequestUserMessage, ChatCompletionTool, ChatCompletionToolChoiceOption,
        ChatCompletionTools, CreateChatCompletionRequestArgs, FunctionCall, FunctionObject,
        ToolChoiceOptions,
    },
    Client,
};

use crate::error::AgentError;
use crate::llm::{LlmClient, LlmResponse, ToolSpec};
use crate::message::{Message, ToolCall};
use crate::stream::MessageChunk;

/// OpenAI Chat Completions client.
///
/// Uses `OPENAI_API_KEY` from the environment by default, or an explicit
/// config via `with_config` (custom key / base URL).
pub struct ChatOpenAI {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl ChatOpenAI {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn messages_to_request(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::System { content } => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(content.as_str()),
                ),
                Message::Human { content } => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(content.as_str()),
                ),
                Message::Assistant {
                    content,
                    tool_calls,
                } => {
                    let mut assistant = ChatCompletionRequestAssistantMessage::from(content.as_str());
                    if !tool_calls.is_empty() {
                        assistant.tool_calls = Some(
                            tool_calls
                                .iter()
                                .map(|tc| {
                                    ChatCompletionMessageToolCalls::Function(
                                        ChatCompletionMessageToolCall {
                                            id: tc.id.clone(),
                                            function: FunctionCall {
                                                name: tc.name.clone(),
                                                arguments: tc.arguments.to_string(),
                                            },
                                        },
                                    )
                                })
                                .collect(),
                        );
                    }
                    ChatCompletionRequestMessage::Assistant(assistant)
                }
                Message::Tool {
                    content,
                    tool_call_id,
                    ..
                } => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                    content: content.as_str().into(),
                    tool_call_id: tool_call_id.clone(),
                }),
            })
            .collect()
    }

    fn tools_to_request(tools: &[ToolSpec]) -> Vec<ChatCompletionTools> {
        tools
            .iter()
            .map(|t| {
                ChatCompletionTools::Function(ChatCompletionTool {
                    function: FunctionObject {
                        name: t.name.clone(),
                        description: Some(t.description.clone()),
                        parameters: Some(t.parameters.clone()),
                        ..Default::default()
                    },
                })
            })
            .collect()
    }

    fn parse_tool_call(id: String, name: String, arguments: String) -> ToolCall {
        let parsed = serde_json::from_str(&arguments).unwrap_or(Value::String(arguments));
        ToolCall {
            id,
            name,
            arguments: parsed,
        }
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        tool_choice: Option<ToolChoiceOptions>,
        stream: bool,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest, AgentError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::messages_to_request(messages));
        if stream {
            args.stream(true);
        }
        if !tools.is_empty() {
            args.tools(Self::tools_to_request(tools));
        }
        if let Some(choice) = tool_choice {
            args.tool_choice(ChatCompletionToolChoiceOption::Mode(choice));
        }
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        args.build()
            .map_err(|e| AgentError::Llm(format!("request build failed: {e}")))
    }
}

#[async_trait]
impl LlmClient for ChatOpenAI {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, AgentError> {
        let request = self.build_request(messages, tools, None, false)?;
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "chat create");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AgentError::Llm(format!("API error: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Llm("no choices in response".into()))?;
        let message = choice.message;
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(f) => Some(Self::parse_tool_call(
                    f.id,
                    f.function.name,
                    f.function.arguments,
                )),
                _ => None,
            })
            .collect();

        Ok(LlmResponse {
            content: message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    async fn invoke_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, AgentError> {
        let Some(chunk_tx) = chunk_tx else {
            return self.invoke(messages, tools).await;
        };

        let request = self.build_request(messages, tools, None, true)?;
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "chat create_stream");

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| AgentError::Llm(format!("stream error: {e}")))?;

        let mut full_content = String::new();
        // index → (id, name, arguments) accumulated across chunks
        let mut tool_call_map: std::collections::HashMap<u32, (String, String, String)> =
            std::collections::HashMap::new();

        while let Some(result) = stream.next().await {
            let response = result.map_err(|e| AgentError::Llm(format!("stream error: {e}")))?;
            for choice in response.choices {
                let delta = &choice.delta;
                if let Some(content) = &delta.content {
                    if !content.is_empty() {
                        full_content.push_str(content);
                        let _ = chunk_tx
                            .send(MessageChunk {
                                content: content.clone(),
                            })
                            .await;
                    }
                }
                if let Some(tool_calls) = &delta.tool_calls {
                    for tc in tool_calls {
                        let entry = tool_call_map.entry(tc.index).or_default();
                        if let Some(id) = &tc.id {
                            if !id.is_empty() {
                                entry.0 = id.clone();
                            }
                        }
                        if let Some(function) = &tc.function {
                            if let Some(name) = &function.name {
                                entry.1.push_str(name);
                            }
                            if let Some(arguments) = &function.arguments {
                                entry.2.push_str(arguments);
                            }
                        }
                    }
                }
            }
        }

        let mut entries: Vec<_> = tool_call_map.into_iter().collect();
        entries.sort_by_key(|(index, _)| *index);
        let tool_calls = entries
            .into_iter()
            .map(|(_, (id, name, arguments))| Self::parse_tool_call(id, name, arguments))
            .collect();

        Ok(LlmResponse {
            content: full_content,
            tool_calls,
        })
    }

    async fn invoke_structured(
        &self,
        messages: &[Message],
        schema_name: &str,
        schema: &Value,
    ) -> Result<Value, AgentError> {
        let tool = ToolSpec {
            name: schema_name.to_string(),
            description: format!("Record the {schema_name} result."),
            parameters: schema.clone(),
        };
        let request = self.build_request(
            messages,
            std::slice::from_ref(&tool),
            Some(ToolChoiceOptions::Required),
            false,
        )?;
        debug!(model = %self.model, schema = schema_name, "chat create (structured)");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AgentError::Llm(format!("API error: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Llm("no choices in response".into()))?;
        let tool_call = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .find_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(f) => Some(f),
                _ => None,
            })
            .ok_or_else(|| {
                AgentError::StructuredOutput(format!("model returned no {schema_name} call"))
            })?;

        serde_json::from_str(&tool_call.function.arguments).map_err(|e| {
            AgentError::StructuredOutput(format!("invalid JSON for {schema_name}: {e}"))
        })
    }
}
