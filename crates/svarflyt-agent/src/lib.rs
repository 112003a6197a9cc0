pub mod graph;
pub mod pipelines;
pub mod readability;
pub mod references;
pub mod registry;

pub use graph::{Collaborators, Graph, GraphBuilder, GraphState, NodeContext, RunEvent, StatePatch};
pub use pipelines::{Pipeline, PipelineRequest, StructuredAnswer, SubqueryOrchestrator, FINAL_ANSWER};
pub use readability::{categorize_lix, lix, LixCategory, LixScore};
pub use references::extract_references;
pub use registry::AgentRegistry;

/// Agent name of the structured-answer pipeline.
pub const STRUCTURED_ANSWER: &str = pipelines::structured_answer::NAME;
/// Agent name of the subquery-orchestrator pipeline.
pub const SUBQUERY_ORCHESTRATOR: &str = pipelines::subquery::NAME;
