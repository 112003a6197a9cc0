use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::BoxFuture;

use svarflyt_core::config::ModelConfig;
use svarflyt_core::error::Result;
use svarflyt_core::event::ProgressSink;
use svarflyt_core::traits::{LlmClient, QueryEngine};
use svarflyt_core::types::ChatMessage;

use super::fanout::FanOut;
use super::state::{GraphState, StatePatch};

/// Identifier of a node in a fixed graph. Each pipeline defines an enum.
pub trait NodeKey: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Stable name used in logs and errors.
    fn name(self) -> &'static str;
}

/// One step: reads the state, performs at most one external call and
/// returns a partial update.
///
/// Implemented for plain functions of the shape
/// `fn(&GraphState, &NodeContext) -> BoxFuture<Result<StatePatch>>`.
pub trait Step: Send + Sync + 'static {
    fn run<'a>(
        &'a self,
        state: &'a GraphState,
        ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StatePatch>>;
}

impl<F> Step for F
where
    F: for<'a> Fn(&'a GraphState, &'a NodeContext) -> BoxFuture<'a, Result<StatePatch>>
        + Send
        + Sync
        + 'static,
{
    fn run<'a>(
        &'a self,
        state: &'a GraphState,
        ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StatePatch>> {
        self(state, ctx)
    }
}

/// A step that changes nothing. Used for split and join points.
pub fn passthrough<'a>(_: &'a GraphState, _: &'a NodeContext) -> BoxFuture<'a, Result<StatePatch>> {
    Box::pin(async { Ok(StatePatch::new()) })
}

/// What a node does when the executor reaches it.
pub enum NodeKind {
    Step(Arc<dyn Step>),
    FanOut(FanOut),
}

/// Read-only backend handles shared by every step of every run.
pub struct Collaborators {
    pub llm: Arc<dyn LlmClient>,
    pub model: ModelConfig,
    pub query_engine: Arc<dyn QueryEngine>,
}

impl Collaborators {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: ModelConfig,
        query_engine: Arc<dyn QueryEngine>,
    ) -> Self {
        Self {
            llm,
            model,
            query_engine,
        }
    }

    /// Send `messages` to the language model and return its text.
    pub async fn invoke(&self, messages: Vec<ChatMessage>) -> Result<String> {
        svarflyt_llm::invoke(self.llm.as_ref(), &self.model, messages).await
    }
}

/// Everything a step gets besides the state.
#[derive(Clone)]
pub struct NodeContext {
    pub collaborators: Arc<Collaborators>,
    pub progress: ProgressSink,
}

impl NodeContext {
    pub fn new(collaborators: Arc<Collaborators>, progress: ProgressSink) -> Self {
        Self {
            collaborators,
            progress,
        }
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("model", &self.collaborators.model.model_id)
            .field("progress", &self.progress)
            .finish()
    }
}
