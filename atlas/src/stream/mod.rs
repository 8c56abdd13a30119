//! Streaming types for graph runs.
//!
//! The run loop in [`CompiledStateGraph::stream`](crate::graph::CompiledStateGraph::stream)
//! emits these events; the service layer projects them into wire events.
//! `Messages` chunks originate from nodes that stream LLM output through the
//! [`RunContext`](crate::graph::RunContext).

use std::fmt::Debug;

use tokio::sync::mpsc;

/// Stream mode selector: which kinds of events the run loop emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// Emit the final state when the run completes.
    Values,
    /// Emit the full state after each node completes, tagged with the node id.
    Updates,
    /// Emit message chunks (LLM token streaming).
    Messages,
    /// Emit node start/end events.
    Tasks,
}

/// Metadata attached to streamed message chunks.
#[derive(Clone, Debug)]
pub struct StreamMetadata {
    /// Graph node id that produced the chunk.
    pub node_id: String,
}

/// One chunk of streamed message content.
#[derive(Clone, Debug)]
pub struct MessageChunk {
    pub content: String,
}

/// Event emitted while running a graph.
#[derive(Clone, Debug)]
pub enum StreamEvent<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Final state at the end of the run.
    Values(S),
    /// State snapshot after the named node finished.
    Updates { node_id: String, state: S },
    /// Message chunk emitted by a node (agent token streaming).
    Messages {
        chunk: MessageChunk,
        metadata: StreamMetadata,
    },
    /// A node began executing.
    TaskStart { node_id: String },
    /// A node finished executing.
    TaskEnd {
        node_id: String,
        result: Result<(), String>,
    },
}

/// Forwards `MessageChunk`s from a node-local channel into the graph stream.
///
/// Nodes that stream tokens create a chunk channel, hand the sender to the
/// LLM call, and run `forward` alongside it with `tokio::join!` so every
/// chunk reaches the stream before the node returns. Returns the number of
/// chunks forwarded so callers can fall back to a single full-content chunk
/// when the provider did not stream.
pub struct ChunkForwarder<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    stream_tx: mpsc::Sender<StreamEvent<S>>,
    node_id: String,
}

impl<S> ChunkForwarder<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    pub fn new(stream_tx: mpsc::Sender<StreamEvent<S>>, node_id: impl Into<String>) -> Self {
        Self {
            stream_tx,
            node_id: node_id.into(),
        }
    }

    pub fn channel(&self) -> (mpsc::Sender<MessageChunk>, mpsc::Receiver<MessageChunk>) {
        mpsc::channel::<MessageChunk>(128)
    }

    /// Drains `chunk_rx` into the graph stream; completes when the sender side
    /// is dropped. Returns the chunk count.
    pub async fn forward(&self, mut chunk_rx: mpsc::Receiver<MessageChunk>) -> usize {
        let mut forwarded = 0;
        while let Some(chunk) = chunk_rx.recv().await {
            forwarded += 1;
            let event = StreamEvent::Messages {
                chunk,
                metadata: StreamMetadata {
                    node_id: self.node_id.clone(),
                },
            };
            let _ = self.stream_tx.send(event).await;
        }
        forwarded
    }
}
