//! Conditional edges: route to the next node based on state.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Routing function: inspects the post-node state and returns a key.
pub type ConditionalRouterFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Router plus optional key → node-id map.
///
/// When `path_map` is present, the router's return value is looked up in it;
/// a missing key falls through to the key itself. Without a map the return
/// value is used directly as the next node id (or END).
pub struct ConditionalRouter<S> {
    pub path: ConditionalRouterFn<S>,
    pub path_map: Option<HashMap<String, String>>,
}

impl<S> ConditionalRouter<S> {
    pub fn new(path: ConditionalRouterFn<S>, path_map: Option<HashMap<String, String>>) -> Self {
        Self { path, path_map }
    }

    /// Resolves the next node id for `state`.
    pub fn resolve(&self, state: &S) -> String {
        let key = (self.path)(state);
        match &self.path_map {
            Some(map) => map.get(&key).cloned().unwrap_or(key),
            None => key,
        }
    }
}

impl<S> Clone for ConditionalRouter<S> {
    fn clone(&self) -> Self {
        Self {
            path: Arc::clone(&self.path),
            path_map: self.path_map.clone(),
        }
    }
}

impl<S> Debug for ConditionalRouter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionalRouter")
            .field("path", &"<fn>")
            .field("path_map", &self.path_map)
            .finish()
    }
}

/// Outgoing routing entry for a node.
pub enum NextEntry<S> {
    Unconditional(String),
    Conditional(ConditionalRouter<S>),
}

impl<S> Clone for NextEntry<S> {
    fn clone(&self) -> Self {
        match self {
            NextEntry::Unconditional(t) => NextEntry::Unconditional(t.clone()),
            NextEntry::Conditional(r) => NextEntry::Conditional(r.clone()),
        }
    }
}
