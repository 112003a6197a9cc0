//! The fixed answer pipelines built on the graph engine.

pub mod structured_answer;
pub mod subquery;

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use svarflyt_core::config::PipelineConfig;
use svarflyt_core::error::Result;

use crate::graph::{Collaborators, Graph, GraphState, NodeContext, NodeKey, RunEvent, StatePatch};

pub use structured_answer::StructuredAnswer;
pub use subquery::SubqueryOrchestrator;

/// State field holding the text returned to the caller.
pub const FINAL_ANSWER: &str = "final_answer";

pub(crate) const QUERY: &str = "query";
pub(crate) const SIMILARITY_CUTOFF: &str = "similarity_cutoff";
pub(crate) const VECTOR_INDEX_DESCRIPTION: &str = "vector_index_description";

/// Caller input for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub query: String,
    pub similarity_cutoff: f64,
    /// What the indexes cover; quoted back when a question is out of scope.
    pub vector_index_description: String,
}

impl PipelineRequest {
    /// A request using the configured cutoff and description.
    pub fn new(query: impl Into<String>, defaults: &PipelineConfig) -> Self {
        Self {
            query: query.into(),
            similarity_cutoff: defaults.similarity_cutoff,
            vector_index_description: defaults.vector_index_description.clone(),
        }
    }

    /// Seed fields shared by every pipeline.
    pub(crate) fn seed(&self) -> Result<StatePatch> {
        StatePatch::new()
            .set(QUERY, &self.query)?
            .set(SIMILARITY_CUTOFF, &self.similarity_cutoff)?
            .set(VECTOR_INDEX_DESCRIPTION, &self.vector_index_description)
    }
}

/// A named, runnable pipeline.
pub trait Pipeline: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Run to completion and return the final answer.
    fn invoke<'a>(
        &'a self,
        request: &'a PipelineRequest,
        ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<String>>;

    /// Run in the background, streaming progress and then the outcome.
    fn stream(
        &self,
        request: &PipelineRequest,
        collaborators: Arc<Collaborators>,
    ) -> BoxStream<'static, RunEvent>;
}

pub(crate) async fn run_to_answer<K: NodeKey>(
    graph: &Graph<K>,
    seed: Result<GraphState>,
    ctx: &NodeContext,
) -> Result<String> {
    let state = graph.run(seed?, ctx).await?;
    state.get(FINAL_ANSWER)
}

pub(crate) fn stream_run<K: NodeKey>(
    graph: &Arc<Graph<K>>,
    seed: Result<GraphState>,
    collaborators: Arc<Collaborators>,
) -> BoxStream<'static, RunEvent> {
    match seed {
        Ok(state) => graph.clone().run_streaming(state, collaborators),
        Err(e) => stream::iter([RunEvent::Failed(e)]).boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_config() {
        let config = PipelineConfig::default();
        let request = PipelineRequest::new("Hva dekker reiseforsikringen?", &config);
        assert_eq!(request.similarity_cutoff, config.similarity_cutoff);
        assert_eq!(request.vector_index_description, config.vector_index_description);
    }

    #[test]
    fn test_seed_fields() {
        let request = PipelineRequest {
            query: "q".into(),
            similarity_cutoff: 0.7,
            vector_index_description: "d".into(),
        };
        let state = GraphState::seeded(request.seed().unwrap()).unwrap();
        assert_eq!(state.get_str(QUERY), Some("q"));
        assert_eq!(state.get::<f64>(SIMILARITY_CUTOFF).unwrap(), 0.7);
        assert_eq!(state.get_str(VECTOR_INDEX_DESCRIPTION), Some("d"));
    }
}
