//! Per-run configuration passed to `CompiledStateGraph::invoke`.

/// Config for one graph run.
#[derive(Clone, Debug, Default)]
pub struct RunnableConfig {
    /// Conversation thread; required for checkpoint persistence.
    pub thread_id: Option<String>,
    /// Caller session; used for per-session rate budgets.
    pub session_id: Option<String>,
}

impl RunnableConfig {
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}
