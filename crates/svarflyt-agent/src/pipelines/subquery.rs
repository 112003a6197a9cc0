//! Subquery orchestrator: plan subqueries, answer each one against the
//! index in parallel, then let the model merge the answers.
//!
//! ```text
//! Plan -> Workers (one per subquery) -> Synthesize
//! ```

use std::fmt::Write as _;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use svarflyt_core::error::Result;
use svarflyt_core::event::ProgressEvent;
use svarflyt_core::types::{ChatMessage, ResponseValidity, SubQuery};
use svarflyt_llm::with_structured_output;

use super::{run_to_answer, stream_run, Pipeline, PipelineRequest, FINAL_ANSWER, QUERY, SIMILARITY_CUTOFF};
use crate::graph::{
    Collaborators, Edge, FanOut, Graph, GraphState, NodeContext, NodeKey, RunEvent, StatePatch,
    WorkItem,
};
use crate::references::extract_references;

pub const NAME: &str = "agent_workflow_subquery_orchestrator";

const SUBQUERIES: &str = "subqueries";

const PLAN_PROMPT: &str = "Rephrase the user query as a subquery in Norwegian. \
If the user query contains several questions, generate several subqueries. \
Do not answer the subqueries.";

const SYNTHESIZE_PROMPT: &str = "from this list of answers, reorganize a final answer. \
Use markdown formatting. Do not change the section for Referanser.";

const REFUSAL: &str = "Jeg beklager, men jeg kan bare svare på spørsmål basert på den gitte konteksten";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubqueryStep {
    Plan,
    Workers,
    Synthesize,
}

impl NodeKey for SubqueryStep {
    fn name(self) -> &'static str {
        match self {
            Self::Plan => "orchestrator",
            Self::Workers => "llm_call",
            Self::Synthesize => "synthesizer",
        }
    }
}

/// The planner's structured reply.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubQueryPlan {
    /// Subqueries that together cover the user query.
    pub subqueries: Vec<SubQueryDraft>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubQueryDraft {
    /// The subquery, in Norwegian.
    pub subquery: String,
}

/// Concatenate the answered subqueries into one markdown document.
pub fn render_sections(subqueries: &[SubQuery]) -> String {
    let mut out = String::new();
    for sq in subqueries {
        let _ = write!(out, "# {}\n\n\n{}\n\n", sq.subquery, sq.answer);
        if !sq.references.is_empty() {
            out.push_str("## Referanser\n");
            for r in &sq.references {
                let _ = writeln!(out, "- [{}]({}) , relevans: {:.2}", r.name, r.url, r.relevance_index);
            }
        }
    }
    out
}

fn plan<'a>(state: &'a GraphState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<StatePatch>> {
    Box::pin(async move {
        ctx.progress.action("Orchestrator that generates a plan for solving the question");
        let query: String = state.get(QUERY)?;

        let planner = with_structured_output::<SubQueryPlan>()?;
        let plan = planner
            .invoke(
                ctx.collaborators.llm.as_ref(),
                &ctx.collaborators.model,
                vec![
                    ChatMessage::system(PLAN_PROMPT),
                    ChatMessage::user(format!("Here is query from a user: {}", query)),
                ],
            )
            .await?;

        info!(subqueries = plan.subqueries.len(), "Query planned");
        let subqueries: Vec<SubQuery> = plan
            .subqueries
            .into_iter()
            .map(|draft| SubQuery::planned(draft.subquery))
            .collect();
        StatePatch::new().set(SUBQUERIES, &subqueries)
    })
}

fn answer_subquery<'a>(item: WorkItem<'a>, ctx: &'a NodeContext) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let mut sq: SubQuery = item.decode()?;
        ctx.progress.action(format!(
            "Worker answers the subquery \"{}\" using the relevant index",
            sq.subquery
        ));
        let cutoff: f64 = item.shared.get(SIMILARITY_CUTOFF)?;

        let response = ctx.collaborators.query_engine.query(&sq.subquery).await?;
        let references = extract_references(&response, cutoff);

        if references.is_empty() {
            warn!(index = item.index, subquery = %sq.subquery, "No relevant result for subquery");
            sq.response_validity = Some(ResponseValidity::NotValid);
            sq.answer = REFUSAL.to_string();
            sq.references.clear();
        } else {
            sq.response_validity = Some(ResponseValidity::Valid);
            sq.references = references;
            sq.answer = response.response;
        }
        Ok(serde_json::to_value(sq)?)
    })
}

fn synthesize<'a>(state: &'a GraphState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<StatePatch>> {
    Box::pin(async move {
        ctx.progress.action("Synthesize full answer from answers from the subqueries");
        let subqueries: Vec<SubQuery> = state.get(SUBQUERIES)?;
        let combined = render_sections(&subqueries);

        let answer = ctx
            .collaborators
            .invoke(vec![
                ChatMessage::system(SYNTHESIZE_PROMPT),
                ChatMessage::user(format!("Here is the list of answers: {}", combined)),
            ])
            .await?;

        ctx.progress.emit(ProgressEvent::FinalAnswer(answer.clone()));
        StatePatch::new().set(FINAL_ANSWER, &answer)
    })
}

fn build_graph() -> Result<Graph<SubqueryStep>> {
    use SubqueryStep::*;

    Graph::builder(NAME)
        .entry(Plan)
        .step(Plan, plan)
        .fan_out(
            Workers,
            FanOut::new(SUBQUERIES, answer_subquery).sharing(&[SIMILARITY_CUTOFF]),
        )
        .step(Synthesize, synthesize)
        .edge(Plan, Edge::always(Workers))
        .edge(Workers, Edge::always(Synthesize))
        .edge(Synthesize, Edge::End)
        .build()
}

/// The subquery-orchestrator pipeline.
pub struct SubqueryOrchestrator {
    graph: Arc<Graph<SubqueryStep>>,
}

impl SubqueryOrchestrator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            graph: Arc::new(build_graph()?),
        })
    }

    fn seed(request: &PipelineRequest) -> Result<GraphState> {
        let patch = request.seed()?.set(SUBQUERIES, &Vec::<SubQuery>::new())?;
        GraphState::seeded(patch)
    }
}

impl Pipeline for SubqueryOrchestrator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn invoke<'a>(
        &'a self,
        request: &'a PipelineRequest,
        ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(run_to_answer(self.graph.as_ref(), Self::seed(request), ctx))
    }

    fn stream(
        &self,
        request: &PipelineRequest,
        collaborators: Arc<Collaborators>,
    ) -> BoxStream<'static, RunEvent> {
        stream_run(&self.graph, Self::seed(request), collaborators)
    }
}
