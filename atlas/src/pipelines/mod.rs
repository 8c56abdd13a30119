//! The three tool pipelines: relational SQL, remote GraphQL, and local
//! documentation lookup. Each is a set of graph nodes over
//! [`AtlasAgentState`](crate::state::AtlasAgentState) with discrete node
//! boundaries; terminal nodes post tool messages back into the shared state.

pub mod docs;
pub mod graphql;
pub mod sql;
