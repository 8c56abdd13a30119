//! Run context handed to nodes: stream writer and per-run config.

use std::collections::HashSet;
use std::fmt::Debug;

use tokio::sync::mpsc;

use crate::memory::RunnableConfig;
use crate::stream::{StreamEvent, StreamMode};

/// Context for one graph run, shared by every node in the run.
pub struct RunContext<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Sender for stream events; `None` for non-streaming invocations.
    pub stream_tx: Option<mpsc::Sender<StreamEvent<S>>>,
    /// Enabled stream modes.
    pub stream_modes: HashSet<StreamMode>,
    /// Per-run config (thread id, session id).
    pub config: RunnableConfig,
}

impl<S> RunContext<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    pub fn new(config: RunnableConfig) -> Self {
        Self {
            stream_tx: None,
            stream_modes: HashSet::new(),
            config,
        }
    }

    pub fn with_stream(
        config: RunnableConfig,
        tx: mpsc::Sender<StreamEvent<S>>,
        modes: HashSet<StreamMode>,
    ) -> Self {
        Self {
            stream_tx: Some(tx),
            stream_modes: modes,
            config,
        }
    }

    /// Whether message-chunk streaming is on and a sender exists.
    pub fn messages_enabled(&self) -> bool {
        self.stream_tx.is_some() && self.stream_modes.contains(&StreamMode::Messages)
    }

    pub fn mode_enabled(&self, mode: StreamMode) -> bool {
        self.stream_modes.contains(&mode)
    }

    /// The stream receiver has gone away; the run should stop.
    pub fn cancelled(&self) -> bool {
        self.stream_tx.as_ref().is_some_and(|tx| tx.is_closed())
    }
}
