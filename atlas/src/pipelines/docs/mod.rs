//! Documentation lookup pipeline.
//!
//! Three nodes: extract the question, have the model choose a document from
//! the static manifest and synthesize an answer from its contents, format a
//! tool message. This pipeline does not count against the per-turn query
//! budget (routing bypasses the gate and format does not increment the
//! counter).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::AgentError;
use crate::graph::Node;
use crate::llm::LlmClient;
use crate::message::Message;
use crate::state::AtlasAgentState;

/// One document in the manifest.
#[derive(Clone, Debug)]
pub struct DocEntry {
    pub slug: &'static str,
    pub title: &'static str,
    pub summary: &'static str,
    pub content: &'static str,
}

/// The static manifest, embedded at compile time.
pub fn docs_manifest() -> Vec<DocEntry> {
    vec![
        DocEntry {
            slug: "classification_systems",
            title: "Product classification systems",
            summary: "HS92/HS12/SITC/services schemas, coverage windows, and join rules.",
            content: include_str!("../../../docs/classification_systems.md"),
        },
        DocEntry {
            slug: "complexity_metrics",
            title: "Economic complexity metrics",
            summary: "Definitions of ECI, PCI, RCA, distance, COG, and COI.",
            content: include_str!("../../../docs/complexity_metrics.md"),
        },
        DocEntry {
            slug: "data_coverage",
            title: "Data coverage and caveats",
            summary: "Sources, year coverage, and known gaps in the trade data.",
            content: include_str!("../../../docs/data_coverage.md"),
        },
    ]
}

fn selection_schema(slugs: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "slug": {
                "type": "string",
                "enum": slugs,
                "description": "The document most likely to answer the question."
            }
        },
        "required": ["slug"]
    })
}

/// Lifts the question out of the docs tool call.
pub struct ExtractDocsQuestion;

#[async_trait]
impl Node<AtlasAgentState> for ExtractDocsQuestion {
    fn id(&self) -> &str {
        "extract_docs_question"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let tool_calls = state
            .last_message()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default();
        let Some(first) = tool_calls.first() else {
            return Err(AgentError::Graph(
                "extract_docs_question reached without a tool call".into(),
            ));
        };
        state.docs_question = first.arg_str("question");
        state.docs_answer = String::new();
        Ok(state)
    }
}

/// Chooses a document and synthesizes an answer from its contents.
pub struct SelectAndSynthesize {
    llm: Arc<dyn LlmClient>,
    manifest: Vec<DocEntry>,
}

impl SelectAndSynthesize {
    pub fn new(llm: Arc<dyn LlmClient>, manifest: Vec<DocEntry>) -> Self {
        Self { llm, manifest }
    }
}

#[async_trait]
impl Node<AtlasAgentState> for SelectAndSynthesize {
    fn id(&self) -> &str {
        "select_and_synthesize"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let listing: String = self
            .manifest
            .iter()
            .map(|d| format!("- {} ({}): {}\n", d.slug, d.title, d.summary))
            .collect();
        let slugs: Vec<&str> = self.manifest.iter().map(|d| d.slug).collect();

        let selection = self
            .llm
            .invoke_structured(
                &[Message::human(format!(
                    "Question about the trade data system: {}\n\nAvailable documentation:\n{listing}\nPick the document most likely to answer it.",
                    state.docs_question
                ))],
                "doc_selection",
                &selection_schema(&slugs),
            )
            .await?;
        let slug = selection
            .get("slug")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let doc = self
            .manifest
            .iter()
            .find(|d| d.slug == slug)
            .or_else(|| {
                warn!(%slug, "model chose an unknown document, falling back to the first");
                self.manifest.first()
            })
            .ok_or_else(|| AgentError::Graph("docs manifest is empty".into()))?;

        let response = self
            .llm
            .invoke(
                &[Message::human(format!(
                    "Answer the question using only this documentation. Be concise and concrete.\n\n\
                     # {}\n{}\n\nQuestion: {}",
                    doc.title, doc.content, state.docs_question
                ))],
                &[],
            )
            .await?;
        state.docs_answer = response.content;
        Ok(state)
    }
}

/// Posts the synthesized answer as a tool message. Does not touch the query
/// counter: docs lookups are free.
pub struct FormatDocsResults;

#[async_trait]
impl Node<AtlasAgentState> for FormatDocsResults {
    fn id(&self) -> &str {
        "format_docs_results"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let tool_calls = state
            .last_message()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default();
        let Some(first) = tool_calls.first() else {
            return Err(AgentError::Graph(
                "format_docs_results reached without a tool call".into(),
            ));
        };
        let content = if state.docs_answer.is_empty() {
            "No relevant documentation found.".to_string()
        } else {
            state.docs_answer.clone()
        };
        let mut messages = vec![Message::tool(content, &first.id, "docs_tool")];
        for tc in &tool_calls[1..] {
            messages.push(Message::tool(
                crate::pipelines::sql::PARALLEL_CALL_STUB,
                &tc.id,
                "docs_tool",
            ));
        }
        state.push_messages(messages);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::message::ToolCall;

    fn docs_tool_state() -> AtlasAgentState {
        let mut state = AtlasAgentState::default();
        state.begin_turn("What does RCA mean?");
        state.push_messages([Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "call_d1".into(),
                name: "docs_tool".into(),
                arguments: json!({"question": "What does RCA mean?"}),
            }],
        )]);
        state
    }

    /// **Scenario**: the pipeline selects a doc, synthesizes, and posts a
    /// tool message without touching the query counter.
    #[tokio::test]
    async fn docs_pipeline_does_not_consume_budget() {
        let llm = Arc::new(MockLlm::new());
        llm.push_structured(json!({"slug": "complexity_metrics"}));
        llm.push_text("RCA compares a country's export share of a product to its overall trade share.");

        let state = ExtractDocsQuestion.run(docs_tool_state()).await.unwrap();
        assert_eq!(state.docs_question, "What does RCA mean?");

        let node = SelectAndSynthesize::new(llm.clone(), docs_manifest());
        let state = node.run(state).await.unwrap();
        assert!(state.docs_answer.contains("RCA"));

        let state = FormatDocsResults.run(state).await.unwrap();
        assert_eq!(state.queries_executed, 0);
        let last = state.last_message().unwrap();
        assert!(matches!(last, Message::Tool { name, .. } if name == "docs_tool"));
    }

    /// **Scenario**: an unknown slug falls back to the first document.
    #[tokio::test]
    async fn unknown_slug_falls_back() {
        let llm = Arc::new(MockLlm::new());
        llm.push_structured(json!({"slug": "nonexistent"}));
        llm.push_text("answer");
        let mut state = docs_tool_state();
        state.docs_question = "coverage?".into();
        let node = SelectAndSynthesize::new(llm, docs_manifest());
        let state = node.run(state).await.unwrap();
        assert_eq!(state.docs_answer, "answer");
    }
}
