//! Compiled state graph: the execution loop.
//!
//! `invoke` runs the graph to completion and returns the final state.
//! `stream` runs the same loop in a background task and emits
//! [`StreamEvent`]s; dropping the receiver cancels the run at the next step
//! boundary. With a checkpointer and a `thread_id`, the state is persisted
//! after every node (step boundary) so concurrent readers always observe a
//! complete step.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::graph::conditional::NextEntry;
use crate::graph::node::Node;
use crate::graph::retry::RetryPolicy;
use crate::graph::run_context::RunContext;
use crate::graph::state_graph::END;
use crate::memory::{Checkpointer, RunnableConfig};
use crate::stream::{StreamEvent, StreamMode};

/// Executable graph produced by `StateGraph::compile`.
pub struct CompiledStateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    first_node_id: String,
    next_map: HashMap<String, NextEntry<S>>,
    retry_policies: HashMap<String, RetryPolicy>,
    checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    max_steps: usize,
}

impl<S> Debug for CompiledStateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledStateGraph")
            .field("first_node_id", &self.first_node_id)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

impl<S> CompiledStateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    pub(crate) fn new(
        nodes: HashMap<String, Arc<dyn Node<S>>>,
        first_node_id: String,
        next_map: HashMap<String, NextEntry<S>>,
        retry_policies: HashMap<String, RetryPolicy>,
        checkpointer: Option<Arc<dyn Checkpointer<S>>>,
        max_steps: usize,
    ) -> Self {
        Self {
            nodes,
            first_node_id,
            next_map,
            retry_policies,
            checkpointer,
            max_steps,
        }
    }

    /// The checkpointer this graph persists to, when configured.
    pub fn checkpointer(&self) -> Option<&Arc<dyn Checkpointer<S>>> {
        self.checkpointer.as_ref()
    }

    /// Runs the graph to completion and returns the final state.
    pub async fn invoke(&self, state: S, config: &RunnableConfig) -> Result<S, AgentError> {
        let ctx = RunContext::new(config.clone());
        self.run_loop(state, &ctx).await
    }

    /// Runs the graph in a background task, emitting stream events.
    ///
    /// The receiver yields events per the enabled `modes`; the final state
    /// arrives as `StreamEvent::Values` when `Values` is enabled. Run errors
    /// surface as a `TaskEnd` with `Err` for the failing node, after which
    /// the channel closes.
    pub fn stream(
        self: &Arc<Self>,
        state: S,
        config: RunnableConfig,
        modes: HashSet<StreamMode>,
    ) -> mpsc::Receiver<StreamEvent<S>> {
        let (tx, rx) = mpsc::channel::<StreamEvent<S>>(256);
        let graph = Arc::clone(self);
        tokio::spawn(async move {
            let ctx = RunContext::with_stream(config, tx, modes);
            if let Err(e) = graph.run_loop(state, &ctx).await {
                warn!(error = %e, "graph run failed");
            }
        });
        rx
    }

    async fn run_loop(&self, mut state: S, ctx: &RunContext<S>) -> Result<S, AgentError> {
        let mut current = self.first_node_id.clone();
        let mut steps = 0usize;

        while current != END {
            if ctx.cancelled() {
                return Err(AgentError::Graph("run cancelled".into()));
            }
            steps += 1;
            if steps > self.max_steps {
                return Err(AgentError::Graph(format!(
                    "step ceiling of {} exceeded at node '{current}'",
                    self.max_steps
                )));
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| AgentError::Graph(format!("unknown node '{current}'")))?;

            self.emit_task_start(ctx, &current).await;
            debug!(node = %current, step = steps, "node start");

            state = match self.run_node(node.as_ref(), &current, state, ctx).await {
                Ok(s) => {
                    self.emit_task_end(ctx, &current, Ok(())).await;
                    s
                }
                Err(e) => {
                    self.emit_task_end(ctx, &current, Err(e.to_string())).await;
                    return Err(e);
                }
            };

            self.emit_updates(ctx, &current, &state).await;
            self.save_checkpoint(&ctx.config, &state).await?;

            current = match self.next_map.get(&current) {
                None => END.to_string(),
                Some(NextEntry::Unconditional(t)) => t.clone(),
                Some(NextEntry::Conditional(router)) => router.resolve(&state),
            };
        }

        if let Some(tx) = &ctx.stream_tx {
            if ctx.mode_enabled(StreamMode::Values) {
                let _ = tx.send(StreamEvent::Values(state.clone())).await;
            }
        }
        Ok(state)
    }

    async fn run_node(
        &self,
        node: &dyn Node<S>,
        id: &str,
        state: S,
        ctx: &RunContext<S>,
    ) -> Result<S, AgentError> {
        let policy = self
            .retry_policies
            .get(id)
            .copied()
            .unwrap_or(RetryPolicy::None);
        let mut attempt: u32 = 0;
        loop {
            match node.run_with_context(state.clone(), ctx).await {
                Ok(s) => return Ok(s),
                Err(e) if e.is_transient() => match policy.delay_for(attempt) {
                    Some(delay) => {
                        warn!(node = id, attempt, error = %e, "transient node failure, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn save_checkpoint(&self, config: &RunnableConfig, state: &S) -> Result<(), AgentError> {
        if let (Some(cp), Some(thread_id)) = (&self.checkpointer, config.thread_id.as_deref()) {
            cp.put(thread_id, state).await?;
        }
        Ok(())
    }

    async fn emit_task_start(&self, ctx: &RunContext<S>, node_id: &str) {
        if let Some(tx) = &ctx.stream_tx {
            if ctx.mode_enabled(StreamMode::Tasks) {
                let _ = tx
                    .send(StreamEvent::TaskStart {
                        node_id: node_id.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn emit_task_end(&self, ctx: &RunContext<S>, node_id: &str, result: Result<(), String>) {
        if let Some(tx) = &ctx.stream_tx {
            if ctx.mode_enabled(StreamMode::Tasks) {
                let _ = tx
                    .send(StreamEvent::TaskEnd {
                        node_id: node_id.to_string(),
                        result,
                    })
                    .await;
            }
        }
    }

    async fn emit_updates(&self, ctx: &RunContext<S>, node_id: &str, state: &S) {
        if let Some(tx) = &ctx.stream_tx {
            if ctx.mode_enabled(StreamMode::Updates) {
                let _ = tx
                    .send(StreamEvent::Updates {
                        node_id: node_id.to_string(),
                        state: state.clone(),
                    })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::graph::{StateGraph, START};

    #[derive(Clone, Debug, Default, PartialEq)]
    struct CountState {
        hops: u32,
    }

    struct HopNode(&'static str);

    #[async_trait]
    impl Node<CountState> for HopNode {
        fn id(&self) -> &str {
            self.0
        }
        async fn run(&self, mut state: CountState) -> Result<CountState, AgentError> {
            state.hops += 1;
            Ok(state)
        }
    }

    struct FlakyNode {
        failures: AtomicU32,
    }

    #[async_trait]
    impl Node<CountState> for FlakyNode {
        fn id(&self) -> &str {
            "flaky"
        }
        async fn run(&self, mut state: CountState) -> Result<CountState, AgentError> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                if f > 0 { Some(f - 1) } else { None }
            })
            .is_ok()
            {
                return Err(AgentError::Llm("rate limited".into()));
            }
            state.hops += 1;
            Ok(state)
        }
    }

    /// **Scenario**: conditional router loops until the state says stop.
    #[tokio::test]
    async fn conditional_loop_until_router_ends() {
        let mut graph = StateGraph::<CountState>::new();
        graph.add_node("hop", Arc::new(HopNode("hop")));
        graph.add_edge(START, "hop");
        graph.add_conditional_edges(
            "hop",
            Arc::new(|s: &CountState| {
                if s.hops < 3 {
                    "hop".to_string()
                } else {
                    END.to_string()
                }
            }),
            None,
        );
        let compiled = graph.compile().unwrap();
        let out = compiled
            .invoke(CountState::default(), &RunnableConfig::default())
            .await
            .unwrap();
        assert_eq!(out.hops, 3);
    }

    /// **Scenario**: the step ceiling aborts a runaway loop.
    #[tokio::test]
    async fn step_ceiling_aborts_runaway() {
        let mut graph = StateGraph::<CountState>::new().with_step_limit(5);
        graph.add_node("hop", Arc::new(HopNode("hop")));
        graph.add_edge(START, "hop");
        graph.add_conditional_edges("hop", Arc::new(|_| "hop".to_string()), None);
        let compiled = graph.compile().unwrap();
        let err = compiled
            .invoke(CountState::default(), &RunnableConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("step ceiling"));
    }

    /// **Scenario**: a transient node failure is retried per policy and the
    /// run succeeds.
    #[tokio::test]
    async fn transient_failure_retried() {
        let mut graph = StateGraph::<CountState>::new();
        graph.add_node_with_retry(
            "flaky",
            Arc::new(FlakyNode {
                failures: AtomicU32::new(2),
            }),
            RetryPolicy::exponential(
                3,
                std::time::Duration::from_millis(1),
                std::time::Duration::from_millis(5),
                2.0,
            ),
        );
        graph.add_edge(START, "flaky");
        graph.add_edge("flaky", END);
        let compiled = graph.compile().unwrap();
        let out = compiled
            .invoke(CountState::default(), &RunnableConfig::default())
            .await
            .unwrap();
        assert_eq!(out.hops, 1);
    }

    /// **Scenario**: stream emits TaskStart before Updates for each node and
    /// Values last.
    #[tokio::test]
    async fn stream_event_ordering() {
        let mut graph = StateGraph::<CountState>::new();
        graph.add_node("hop", Arc::new(HopNode("hop")));
        graph.add_edge(START, "hop");
        graph.add_edge("hop", END);
        let compiled = Arc::new(graph.compile().unwrap());

        let modes: HashSet<StreamMode> = [
            StreamMode::Values,
            StreamMode::Updates,
            StreamMode::Tasks,
        ]
        .into_iter()
        .collect();
        let mut rx = compiled.stream(CountState::default(), RunnableConfig::default(), modes);

        let mut names = Vec::new();
        while let Some(event) = rx.recv().await {
            names.push(match event {
                StreamEvent::TaskStart { .. } => "task_start",
                StreamEvent::TaskEnd { .. } => "task_end",
                StreamEvent::Updates { .. } => "updates",
                StreamEvent::Values(_) => "values",
                StreamEvent::Messages { .. } => "messages",
            });
        }
        assert_eq!(names, vec!["task_start", "task_end", "updates", "values"]);
    }
}
