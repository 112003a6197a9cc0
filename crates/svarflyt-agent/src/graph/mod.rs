//! Graph execution engine: a small interpreter for fixed step graphs.
//!
//! A graph is a table from node identifiers (an enum per pipeline) to a
//! handler and one outgoing `Edge`. Edges are unconditional, conditional
//! (a router picks a named branch), a fixed-arity parallel split that
//! joins into one node, or the terminal `End`.
//!
//! Steps read the `GraphState` and return a `StatePatch`; the executor
//! merges each patch last-writer-wins and advances. A `FanOut` node
//! spawns one worker per element of a list field and writes the filled
//! list back once every worker has returned.
//!
//! Loops are allowed. The executor never bounds them: the router owning
//! a back-edge decides when to leave, based on a counter kept in state.

pub mod edge;
pub mod executor;
pub mod fanout;
pub mod node;
pub mod state;

pub use edge::{Edge, Router};
pub use executor::{Graph, GraphBuilder, RunEvent};
pub use fanout::{fan_out, join, FanOut, WorkItem, Worker};
pub use node::{passthrough, Collaborators, NodeContext, NodeKey, NodeKind, Step};
pub use state::{GraphState, StatePatch};

#[cfg(test)]
pub(crate) fn test_collaborators() -> std::sync::Arc<Collaborators> {
    use std::sync::Arc;
    use svarflyt_test_utils::{model_config, MockLlm, MockQueryEngine};

    Arc::new(Collaborators::new(
        Arc::new(MockLlm::scripted(Vec::new())),
        model_config(),
        Arc::new(MockQueryEngine::new()),
    ))
}

#[cfg(test)]
pub(crate) fn test_context() -> NodeContext {
    NodeContext::new(test_collaborators(), svarflyt_core::ProgressSink::disabled())
}
