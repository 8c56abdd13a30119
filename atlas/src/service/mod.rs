//! The answer service: runs the graph for one turn and surfaces the result
//! as a structured answer (non-streaming) or a typed event stream.

pub mod projection;

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, warn};

pub use stream_event::ChatEvent;

use crate::config::{AgentMode, TradeDirection, TradeMode, TradeSchema};
use crate::error::AgentError;
use crate::graph::CompiledStateGraph;
use crate::links::AtlasLink;
use crate::memory::{Checkpointer, RunnableConfig};
use crate::message::Message;
use crate::state::{AtlasAgentState, QueryRecord, TurnSummary};
use crate::stream::{StreamEvent, StreamMode};

use projection::project_pipeline_state;

/// Per-request overrides carried into the conversation state.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChatOverrides {
    pub schema: Option<TradeSchema>,
    pub direction: Option<TradeDirection>,
    pub mode: Option<TradeMode>,
    pub agent_mode: Option<AgentMode>,
}

/// Structured result of one non-streaming turn.
#[derive(Clone, Debug, serde::Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub thread_id: String,
    pub queries: Vec<QueryRecord>,
    pub resolved_products: Option<String>,
    pub schemas_used: Vec<String>,
    pub total_rows: usize,
    pub total_execution_time_ms: u64,
    pub atlas_links: Vec<AtlasLink>,
}

/// Runs the agent graph per turn, persists checkpoints and turn summaries,
/// and projects execution into wire events.
pub struct AtlasService {
    graph: Arc<CompiledStateGraph<AtlasAgentState>>,
}

impl AtlasService {
    pub fn new(graph: Arc<CompiledStateGraph<AtlasAgentState>>) -> Self {
        Self { graph }
    }

    fn checkpointer(&self) -> Option<&Arc<dyn Checkpointer<AtlasAgentState>>> {
        self.graph.checkpointer()
    }

    /// Latest persisted state for a thread, if any.
    pub async fn thread_state(
        &self,
        thread_id: &str,
    ) -> Result<Option<AtlasAgentState>, AgentError> {
        match self.checkpointer() {
            Some(cp) => Ok(cp.get_latest(thread_id).await?),
            None => Ok(None),
        }
    }

    /// Drops a thread's checkpoint; missing threads are a no-op.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), AgentError> {
        if let Some(cp) = self.checkpointer() {
            cp.delete(thread_id).await?;
        }
        Ok(())
    }

    async fn prepare_state(
        &self,
        question: &str,
        thread_id: &str,
        overrides: ChatOverrides,
    ) -> Result<AtlasAgentState, AgentError> {
        let mut state = self.thread_state(thread_id).await?.unwrap_or_default();
        if let Some(schema) = overrides.schema {
            state.override_schema = Some(schema);
        }
        if let Some(direction) = overrides.direction {
            state.override_direction = Some(direction);
        }
        if let Some(mode) = overrides.mode {
            state.override_mode = Some(mode);
        }
        if let Some(agent_mode) = overrides.agent_mode {
            state.override_agent_mode = Some(agent_mode);
        }
        state.begin_turn(question);
        Ok(state)
    }

    /// The final answer text: the trailing run of assistant messages.
    fn final_answer(state: &AtlasAgentState) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for message in state.messages.iter().rev() {
            match message {
                Message::Assistant { content, tool_calls } if tool_calls.is_empty() => {
                    parts.push(content);
                }
                _ => break,
            }
        }
        parts.reverse();
        parts.join("")
    }

    fn build_summary(question: &str, state: &AtlasAgentState) -> TurnSummary {
        TurnSummary {
            question: question.to_string(),
            schemas_used: state.schemas_used(),
            queries: state.turn_queries.len(),
            atlas_links: state.graphql_atlas_links.clone(),
            total_rows: state.turn_queries.iter().map(|q| q.row_count).sum(),
            total_execution_time_ms: state.turn_queries.iter().map(|q| q.execution_time_ms).sum(),
        }
    }

    async fn finish_turn(
        &self,
        question: &str,
        thread_id: &str,
        mut state: AtlasAgentState,
    ) -> Result<AtlasAgentState, AgentError> {
        let summary = Self::build_summary(question, &state);
        state.append_turn_summaries([summary]);
        if let Some(cp) = self.checkpointer() {
            cp.put(thread_id, &state).await?;
        }
        Ok(state)
    }

    /// Runs a turn to completion and returns the aggregated result.
    pub async fn answer_question(
        &self,
        question: &str,
        thread_id: &str,
        overrides: ChatOverrides,
        session_id: Option<String>,
    ) -> Result<AnswerResult, AgentError> {
        let state = self.prepare_state(question, thread_id, overrides).await?;
        let config = RunnableConfig::for_thread(thread_id).with_session(session_id);
        let state = self.graph.invoke(state, &config).await?;
        let state = self.finish_turn(question, thread_id, state).await?;

        Ok(AnswerResult {
            answer: Self::final_answer(&state),
            thread_id: thread_id.to_string(),
            resolved_products: (!state.pipeline_codes.is_empty())
                .then(|| state.pipeline_codes.clone()),
            schemas_used: state.schemas_used(),
            total_rows: state.turn_queries.iter().map(|q| q.row_count).sum(),
            total_execution_time_ms: state.turn_queries.iter().map(|q| q.execution_time_ms).sum(),
            atlas_links: state.graphql_atlas_links.clone(),
            queries: state.turn_queries,
        })
    }

    /// Runs a turn, emitting typed events. The first event is `thread_id`,
    /// the last is `done`; dropping the receiver cancels the run.
    pub fn answer_question_stream(
        self: &Arc<Self>,
        question: String,
        thread_id: String,
        overrides: ChatOverrides,
        session_id: Option<String>,
    ) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel::<ChatEvent>(256);
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let _ = tx
                .send(ChatEvent::ThreadId {
                    thread_id: thread_id.clone(),
                })
                .await;

            let state = match service.prepare_state(&question, &thread_id, overrides).await {
                Ok(state) => state,
                Err(e) => {
                    error!(error = %e, "failed to prepare turn state");
                    let _ = tx
                        .send(ChatEvent::tool_output("system", format!("Error: {e}")))
                        .await;
                    let _ = tx
                        .send(ChatEvent::Done {
                            payload: json!({
                                "thread_id": thread_id,
                                "total_queries": 0,
                                "total_time_ms": started.elapsed().as_millis() as u64,
                            }),
                        })
                        .await;
                    return;
                }
            };

            let config = RunnableConfig::for_thread(&thread_id).with_session(session_id);
            let modes = [
                StreamMode::Values,
                StreamMode::Updates,
                StreamMode::Messages,
                StreamMode::Tasks,
            ]
            .into_iter()
            .collect();
            let mut events = service.graph.stream(state, config, modes);

            let mut graphql_successes = 0usize;
            let mut final_state: Option<AtlasAgentState> = None;

            while let Some(event) = events.recv().await {
                match event {
                    StreamEvent::TaskStart { node_id } if node_id != "agent" => {
                        let _ = tx.send(ChatEvent::node_start(node_id)).await;
                    }
                    StreamEvent::TaskStart { .. } => {}
                    StreamEvent::TaskEnd { node_id, result } => {
                        if let Err(message) = result {
                            warn!(node = %node_id, %message, "node failed");
                            let _ = tx
                                .send(ChatEvent::tool_output(
                                    node_id,
                                    format!("Error: {message}"),
                                ))
                                .await;
                        }
                    }
                    StreamEvent::Messages { chunk, metadata } => {
                        if metadata.node_id == "agent" && !chunk.content.is_empty() {
                            let _ = tx.send(ChatEvent::agent_talk(chunk.content)).await;
                        }
                    }
                    StreamEvent::Updates { node_id, state } => {
                        if node_id == "agent" {
                            if let Some(last) = state.last_message() {
                                for tool_call in last.tool_calls() {
                                    let _ = tx
                                        .send(ChatEvent::tool_call(
                                            tool_call.name.clone(),
                                            tool_call.arguments.to_string(),
                                        ))
                                        .await;
                                }
                            }
                            continue;
                        }
                        if node_id == "build_and_execute_graphql"
                            && state.last_error.is_empty()
                            && state.graphql_raw_response.is_some()
                        {
                            graphql_successes += 1;
                        }
                        match project_pipeline_state(&node_id, &state) {
                            Ok(Some(payload)) => {
                                let _ = tx.send(ChatEvent::PipelineState { payload }).await;
                            }
                            Ok(None) => {}
                            Err(e) => {
                                error!(error = %e, "pipeline-state projection failed");
                                return;
                            }
                        }
                        if matches!(
                            node_id.as_str(),
                            "format_results"
                                | "format_graphql_results"
                                | "format_docs_results"
                                | "max_queries_exceeded"
                        ) {
                            if let Some(Message::Tool { content, name, .. }) = state
                                .messages
                                .iter()
                                .rev()
                                .find(|m| matches!(m, Message::Tool { .. }))
                            {
                                let _ = tx
                                    .send(ChatEvent::tool_output(name.clone(), content.clone()))
                                    .await;
                            }
                        }
                    }
                    StreamEvent::Values(state) => {
                        final_state = Some(state);
                    }
                }
            }

            let total_queries;
            let total_rows;
            match final_state {
                Some(state) => {
                    total_queries = state.turn_queries.len() + graphql_successes;
                    total_rows = state.turn_queries.iter().map(|q| q.row_count).sum::<usize>();
                    if let Err(e) = service.finish_turn(&question, &thread_id, state).await {
                        error!(error = %e, "failed to persist turn summary");
                    }
                }
                None => {
                    total_queries = 0;
                    total_rows = 0;
                }
            }

            let _ = tx
                .send(ChatEvent::Done {
                    payload: json!({
                        "thread_id": thread_id,
                        "total_queries": total_queries,
                        "total_rows": total_rows,
                        "total_time_ms": started.elapsed().as_millis().max(1) as u64,
                    }),
                })
                .await;
        });
        rx
    }
}
