//! The agent node: mode resolution, tool binding, prompt assembly, and the
//! reasoning step that decides between tool calls and a final answer.

pub mod build;
pub mod prompts;
pub mod tools;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::join;

use crate::config::AgentMode;
use crate::error::AgentError;
use crate::graph::{Node, RunContext};
use crate::graphql::BudgetTracker;
use crate::llm::{LlmClient, LlmResponse, ToolSpec};
use crate::message::Message;
use crate::state::AtlasAgentState;
use crate::stream::ChunkForwarder;

use prompts::{
    build_sql_system_prompt, dual_tool_extension, graphql_only_extension, override_lines,
    NUDGE_MESSAGE,
};
use tools::{atlas_graphql_tool_spec, docs_tool_spec, query_tool_spec};

/// Resolves the effective mode for this invocation.
///
/// AUTO falls back to SQL-only when the budget is unavailable. The check
/// happens once per agent-node entry; a mid-turn budget refill does not
/// promote the mode within the same turn.
pub fn resolve_effective_mode(
    config_mode: AgentMode,
    budget: Option<&BudgetTracker>,
) -> AgentMode {
    match config_mode {
        AgentMode::SqlOnly => AgentMode::SqlOnly,
        AgentMode::GraphqlSql => AgentMode::GraphqlSql,
        AgentMode::GraphqlOnly => AgentMode::GraphqlOnly,
        AgentMode::Auto => {
            if budget.map(|b| b.is_available(None)).unwrap_or(false) {
                AgentMode::GraphqlSql
            } else {
                AgentMode::SqlOnly
            }
        }
    }
}

/// The reasoning node. Builds the system prompt from the effective mode,
/// binds the allowed tools, invokes the model (streaming tokens when the run
/// streams), and appends the assistant message.
pub struct AgentNode {
    llm: Arc<dyn LlmClient>,
    agent_mode: AgentMode,
    max_uses: u32,
    top_k: usize,
    budget: Option<Arc<BudgetTracker>>,
    nudge_enabled: bool,
}

impl AgentNode {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        agent_mode: AgentMode,
        max_uses: u32,
        top_k: usize,
        budget: Option<Arc<BudgetTracker>>,
    ) -> Self {
        Self {
            llm,
            agent_mode,
            max_uses,
            top_k,
            budget,
            nudge_enabled: true,
        }
    }

    pub fn with_nudge(mut self, enabled: bool) -> Self {
        self.nudge_enabled = enabled;
        self
    }

    fn effective_mode(&self, state: &AtlasAgentState) -> AgentMode {
        let config_mode = state.override_agent_mode.unwrap_or(self.agent_mode);
        resolve_effective_mode(config_mode, self.budget.as_deref())
    }

    fn bound_tools(&self, mode: AgentMode) -> Vec<ToolSpec> {
        match mode {
            AgentMode::SqlOnly => vec![query_tool_spec(), docs_tool_spec()],
            AgentMode::GraphqlOnly => vec![atlas_graphql_tool_spec(), docs_tool_spec()],
            _ => vec![query_tool_spec(), atlas_graphql_tool_spec(), docs_tool_spec()],
        }
    }

    fn budget_status(&self) -> String {
        match &self.budget {
            Some(budget) => format!(
                "Available ({} calls remaining this window)",
                budget.remaining(None)
            ),
            None => "unknown".to_string(),
        }
    }

    fn system_prompt(&self, state: &AtlasAgentState, mode: AgentMode) -> String {
        let mut prompt = build_sql_system_prompt(self.max_uses, self.top_k);
        match mode {
            AgentMode::SqlOnly => {}
            AgentMode::GraphqlOnly => {
                prompt.push_str(&graphql_only_extension(&self.budget_status()));
            }
            _ => {
                prompt.push_str(&dual_tool_extension(self.max_uses, &self.budget_status()));
            }
        }
        if let Some(lines) = override_lines(state) {
            prompt.push_str(&lines);
        }
        prompt
    }

    async fn invoke_model(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        ctx: &RunContext<AtlasAgentState>,
    ) -> Result<LlmResponse, AgentError> {
        match (ctx.messages_enabled(), ctx.stream_tx.clone()) {
            (true, Some(tx)) => {
                let forwarder = ChunkForwarder::new(tx, "agent");
                let (chunk_tx, chunk_rx) = forwarder.channel();
                let (response, _forwarded) = join!(
                    self.llm.invoke_stream(messages, tools, Some(chunk_tx)),
                    forwarder.forward(chunk_rx),
                );
                response
            }
            _ => self.llm.invoke(messages, tools).await,
        }
    }
}

#[async_trait]
impl Node<AtlasAgentState> for AgentNode {
    fn id(&self) -> &str {
        "agent"
    }

    async fn run(&self, state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let ctx = RunContext::new(Default::default());
        self.run_with_context(state, &ctx).await
    }

    async fn run_with_context(
        &self,
        mut state: AtlasAgentState,
        ctx: &RunContext<AtlasAgentState>,
    ) -> Result<AtlasAgentState, AgentError> {
        let mode = self.effective_mode(&state);
        let tools = self.bound_tools(mode);
        let system = Message::system(self.system_prompt(&state, mode));

        let mut prompt_messages = Vec::with_capacity(state.messages.len() + 1);
        prompt_messages.push(system.clone());
        prompt_messages.extend(state.messages.iter().cloned());

        let response = self.invoke_model(&prompt_messages, &tools, ctx).await?;

        let wants_to_end = response.tool_calls.is_empty();
        let never_used_a_tool = state.queries_executed == 0
            && !state
                .messages
                .iter()
                .any(|m| matches!(m, Message::Tool { .. }));

        if self.nudge_enabled && wants_to_end && never_used_a_tool && !state.nudge_issued {
            // One-shot: push the draft answer and the nudge, then re-invoke.
            state.push_messages([
                Message::assistant_with_tool_calls(response.content, response.tool_calls),
                Message::human(NUDGE_MESSAGE),
            ]);
            state.nudge_issued = true;

            let mut prompt_messages = Vec::with_capacity(state.messages.len() + 1);
            prompt_messages.push(system);
            prompt_messages.extend(state.messages.iter().cloned());
            let response = self.invoke_model(&prompt_messages, &tools, ctx).await?;
            state.push_messages([Message::assistant_with_tool_calls(
                response.content,
                response.tool_calls,
            )]);
            return Ok(state);
        }

        state.push_messages([Message::assistant_with_tool_calls(
            response.content,
            response.tool_calls,
        )]);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use serde_json::json;
    use std::time::Duration;

    /// **Scenario**: explicit modes pass through; AUTO resolves on budget.
    #[test]
    fn mode_resolution() {
        let budget = BudgetTracker::new(1, Duration::from_secs(60));
        assert_eq!(
            resolve_effective_mode(AgentMode::SqlOnly, Some(&budget)),
            AgentMode::SqlOnly
        );
        assert_eq!(
            resolve_effective_mode(AgentMode::GraphqlSql, None),
            AgentMode::GraphqlSql
        );
        assert_eq!(
            resolve_effective_mode(AgentMode::Auto, Some(&budget)),
            AgentMode::GraphqlSql
        );
        budget.consume(None);
        assert_eq!(
            resolve_effective_mode(AgentMode::Auto, Some(&budget)),
            AgentMode::SqlOnly
        );
        // AUTO without a tracker degrades to SQL-only.
        assert_eq!(
            resolve_effective_mode(AgentMode::Auto, None),
            AgentMode::SqlOnly
        );
    }

    /// **Scenario**: the per-request override outranks the constructed mode.
    #[tokio::test]
    async fn request_override_wins() {
        let llm = Arc::new(MockLlm::new());
        llm.push_text("hello");
        let node = AgentNode::new(llm, AgentMode::GraphqlSql, 3, 15, None).with_nudge(false);
        let mut state = AtlasAgentState::default();
        state.override_agent_mode = Some(AgentMode::SqlOnly);
        assert_eq!(node.effective_mode(&state), AgentMode::SqlOnly);
    }

    /// **Scenario**: a direct answer to a data-less turn triggers the nudge
    /// once; the second response is final.
    #[tokio::test]
    async fn nudge_fires_once() {
        let llm = Arc::new(MockLlm::new());
        llm.push_text("It's soybeans, trust me.");
        llm.push_tool_call("c1", "query_tool", json!({"question": "top exports of Brazil"}));
        let node = AgentNode::new(llm.clone(), AgentMode::SqlOnly, 3, 15, None);

        let mut state = AtlasAgentState::default();
        state.begin_turn("Top exports of Brazil?");
        let state = node.run(state).await.unwrap();

        assert!(state.nudge_issued);
        let nudges = state
            .messages
            .iter()
            .filter(|m| m.content() == NUDGE_MESSAGE)
            .count();
        assert_eq!(nudges, 1);
        // Final assistant message carries the tool call.
        assert_eq!(state.last_message().unwrap().tool_calls().len(), 1);
    }

    /// **Scenario**: the nudge does not fire on follow-up turns that already
    /// have tool messages, nor twice in one turn.
    #[tokio::test]
    async fn nudge_suppressed_after_tool_use() {
        let llm = Arc::new(MockLlm::new());
        llm.push_text("Based on the query results, soybeans lead.");
        let node = AgentNode::new(llm, AgentMode::SqlOnly, 3, 15, None);

        let mut state = AtlasAgentState::default();
        state.begin_turn("Top exports of Brazil?");
        state.queries_executed = 1;
        state.push_messages([
            Message::assistant_with_tool_calls(
                "",
                vec![crate::message::ToolCall {
                    id: "c1".into(),
                    name: "query_tool".into(),
                    arguments: json!({"question": "q"}),
                }],
            ),
            Message::tool("rows", "c1", "query_tool"),
        ]);
        let state = node.run(state).await.unwrap();
        assert!(!state.nudge_issued);
        assert!(state.last_message().unwrap().tool_calls().is_empty());
    }
}
