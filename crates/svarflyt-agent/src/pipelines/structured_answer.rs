//! Structured answer: query, validate, enrich with metadata, then revise
//! the answer until it reads easily or the revision budget is spent.
//!
//! ```text
//! Answer -> Validate --Rejected--------------------------------------> Aggregate
//!              `--Accepted--> CollectMetadata => {ShortTitle, Summary, References}
//!                                  => MetadataReady -> Readability --ok--> Aggregate
//!                                                        ^    `--revise--> Revise
//!                                                        `-------------------'
//! ```

use std::fmt::Write as _;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use svarflyt_core::error::Result;
use svarflyt_core::event::ProgressEvent;
use svarflyt_core::types::{ChatMessage, QueryResponse, Reference};

use super::{
    run_to_answer, stream_run, Pipeline, PipelineRequest, FINAL_ANSWER, QUERY, SIMILARITY_CUTOFF,
    VECTOR_INDEX_DESCRIPTION,
};
use crate::graph::{
    passthrough, Collaborators, Edge, Graph, GraphState, NodeContext, NodeKey, RunEvent,
    StatePatch,
};
use crate::readability::{categorize_lix, lix, needs_revision};
use crate::references::extract_references;

pub const NAME: &str = "agent_workflow_structured_answer";

const RESPONSE: &str = "response";
const ANSWER: &str = "answer";
const VALIDATION: &str = "validate_response_result";
const FEEDBACK: &str = "feedback";
const QUERY_SHORT_VERSION: &str = "query_short_version";
const QUERY_SUMMARY: &str = "query_summary";
const REFERENCES: &str = "references";
const LIX_SCORE: &str = "lix_score";
const LIX_CATEGORY: &str = "lix_category";
const READABLE_OR_NOT: &str = "readable_or_not";
const NUM_ITERATIONS: &str = "num_iterations";

const REVISE_FEEDBACK: &str = "Make this text more readable: shorter sentences & simpler language.";
const NO_FEEDBACK: &str = "No need for improvements";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerStep {
    Answer,
    Validate,
    CollectMetadata,
    ShortTitle,
    Summary,
    References,
    MetadataReady,
    Readability,
    Revise,
    Aggregate,
}

impl NodeKey for AnswerStep {
    fn name(self) -> &'static str {
        match self {
            Self::Answer => "llm_call_answer",
            Self::Validate => "validate_response",
            Self::CollectMetadata => "collect_all_metadata",
            Self::ShortTitle => "llm_call_short_version_generator",
            Self::Summary => "llm_call_summary_generator",
            Self::References => "references_generator",
            Self::MetadataReady => "metadata_ready",
            Self::Readability => "readability_evaluator",
            Self::Revise => "llm_make_answer_more_readable",
            Self::Aggregate => "aggregator",
        }
    }
}

/// Outcome of checking the backend response against the cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validation {
    Accepted,
    Rejected,
}

/// Accepted iff at least one result scores at or above `cutoff`.
pub fn validate(response: &QueryResponse, cutoff: f64) -> Validation {
    if response.has_match(cutoff) {
        Validation::Accepted
    } else {
        Validation::Rejected
    }
}

/// The reply given when no result is relevant enough.
pub fn apology(vector_index_description: &str) -> String {
    format!(
        "Jeg beklager! {}. Hvis du har spørsmål om disse emnene, kan jeg prøve å hjelpe deg. Gi beskjed!",
        vector_index_description
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Verdict {
    #[serde(rename = "readable")]
    Readable,
    #[serde(rename = "not readable")]
    NotReadable,
}

/// Assemble the markdown report for an accepted answer.
pub fn render_report(
    query: &str,
    title: &str,
    summary: &str,
    answer: &str,
    references: &[Reference],
) -> String {
    let mut out = String::from("# Oppsummering av spørsmålet\n\n");
    for (heading, body) in [
        ("Spørsmålet", query),
        ("Tittel", title),
        ("Sammendrag", summary),
        ("Svar", answer),
    ] {
        let _ = write!(out, "## {}\n{}\n\n", heading, body);
    }
    if !references.is_empty() {
        out.push_str("## Referanser\n");
        for r in references {
            let _ = writeln!(out, "- [{}]({}) (Relevans: {:.2})", r.name, r.url, r.relevance_index);
        }
    }
    out
}

// ── Steps ───────────────────────────────────────────────────────

fn answer<'a>(state: &'a GraphState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<StatePatch>> {
    Box::pin(async move {
        let query: String = state.get(QUERY)?;
        let response = ctx.collaborators.query_engine.query(&query).await?;
        ctx.progress.action("Calling llm to get the initial answer");
        StatePatch::new()
            .set(ANSWER, &response.response)?
            .set(RESPONSE, &response)
    })
}

fn validate_response<'a>(
    state: &'a GraphState,
    ctx: &'a NodeContext,
) -> BoxFuture<'a, Result<StatePatch>> {
    Box::pin(async move {
        ctx.progress.action("Validating the response");
        let response: QueryResponse = state.get(RESPONSE)?;
        let cutoff: f64 = state.get(SIMILARITY_CUTOFF)?;

        match validate(&response, cutoff) {
            Validation::Accepted => StatePatch::new().set(VALIDATION, &Validation::Accepted),
            Validation::Rejected => {
                warn!(cutoff, results = response.source_nodes.len(), "No result above cutoff");
                let description: String = state.get(VECTOR_INDEX_DESCRIPTION)?;
                StatePatch::new()
                    .set(VALIDATION, &Validation::Rejected)?
                    .set(FEEDBACK, &apology(&description))
            }
        }
    })
}

fn short_title<'a>(state: &'a GraphState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<StatePatch>> {
    Box::pin(async move {
        ctx.progress.action("Generating a short version");
        let query: String = state.get(QUERY)?;
        let prompt = format!("Gi en kort tittel på norsk, behold 'I'-formen: {}", query);
        let title = ctx.collaborators.invoke(vec![ChatMessage::user(prompt)]).await?;
        StatePatch::new().set(QUERY_SHORT_VERSION, &title)
    })
}

fn summary<'a>(state: &'a GraphState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<StatePatch>> {
    Box::pin(async move {
        ctx.progress.action("Generating a summary");
        let query: String = state.get(QUERY)?;
        let prompt = format!(
            "Oppsummer spørsmålet på norsk i én setning, behold 'I'-formen: {}",
            query
        );
        let summary = ctx.collaborators.invoke(vec![ChatMessage::user(prompt)]).await?;
        StatePatch::new().set(QUERY_SUMMARY, &summary)
    })
}

fn references<'a>(state: &'a GraphState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<StatePatch>> {
    Box::pin(async move {
        ctx.progress.action("Building references");
        let response: QueryResponse = state.get(RESPONSE)?;
        let cutoff: f64 = state.get(SIMILARITY_CUTOFF)?;
        StatePatch::new().set(REFERENCES, &extract_references(&response, cutoff))
    })
}

fn readability<'a>(state: &'a GraphState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<StatePatch>> {
    Box::pin(async move {
        ctx.progress.action("Evaluating readability");
        let answer: String = state.get(ANSWER)?;
        let iterations: u32 = state.get(NUM_ITERATIONS)?;
        let score = lix(&answer);

        let (verdict, feedback) = if needs_revision(score.lix, iterations) {
            (Verdict::NotReadable, REVISE_FEEDBACK)
        } else {
            (Verdict::Readable, NO_FEEDBACK)
        };
        info!(lix = score.lix, iterations, ?verdict, "Readability evaluated");

        StatePatch::new()
            .set(LIX_SCORE, &score.lix)?
            .set(LIX_CATEGORY, categorize_lix(score.lix).label())?
            .set(READABLE_OR_NOT, &verdict)?
            .set(FEEDBACK, feedback)
    })
}

fn revise<'a>(state: &'a GraphState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<StatePatch>> {
    Box::pin(async move {
        ctx.progress.action("Making answer more readable");
        let answer: String = state.get(ANSWER)?;
        let feedback: String = state.get(FEEDBACK)?;
        let iterations: u32 = state.get(NUM_ITERATIONS)?;

        let prompt = format!("Improve readability: {}. Feedback: {}", answer, feedback);
        let revised = ctx.collaborators.invoke(vec![ChatMessage::user(prompt)]).await?;
        StatePatch::new()
            .set(ANSWER, &revised)?
            .set(NUM_ITERATIONS, &(iterations + 1))
    })
}

fn aggregate<'a>(state: &'a GraphState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<StatePatch>> {
    Box::pin(async move {
        ctx.progress.action("Aggregating final response");
        let final_answer = match state.get::<Validation>(VALIDATION)? {
            Validation::Rejected => state.get::<String>(FEEDBACK)?,
            Validation::Accepted => {
                let references: Vec<Reference> = state.get(REFERENCES)?;
                render_report(
                    &state.get::<String>(QUERY)?,
                    &state.get::<String>(QUERY_SHORT_VERSION)?,
                    &state.get::<String>(QUERY_SUMMARY)?,
                    &state.get::<String>(ANSWER)?,
                    &references,
                )
            }
        };
        ctx.progress.emit(ProgressEvent::FinalAnswer(final_answer.clone()));
        StatePatch::new().set(FINAL_ANSWER, &final_answer)
    })
}

// ── Routers ─────────────────────────────────────────────────────

fn route_validation(state: &GraphState) -> Result<&'static str> {
    Ok(match state.get::<Validation>(VALIDATION)? {
        Validation::Accepted => "Accepted",
        Validation::Rejected => "Rejected",
    })
}

fn route_readability(state: &GraphState) -> Result<&'static str> {
    Ok(match state.get::<Verdict>(READABLE_OR_NOT)? {
        Verdict::Readable => "ok",
        Verdict::NotReadable => "revise",
    })
}

fn build_graph() -> Result<Graph<AnswerStep>> {
    use AnswerStep::*;

    Graph::builder(NAME)
        .entry(Answer)
        .step(Answer, answer)
        .step(Validate, validate_response)
        .step(CollectMetadata, passthrough)
        .step(ShortTitle, short_title)
        .step(Summary, summary)
        .step(References, references)
        .step(MetadataReady, passthrough)
        .step(Readability, readability)
        .step(Revise, revise)
        .step(Aggregate, aggregate)
        .edge(Answer, Edge::always(Validate))
        .edge(
            Validate,
            Edge::conditional(
                route_validation,
                &[("Rejected", Aggregate), ("Accepted", CollectMetadata)],
            ),
        )
        .edge(
            CollectMetadata,
            Edge::parallel(&[ShortTitle, Summary, References], MetadataReady),
        )
        .edge(MetadataReady, Edge::always(Readability))
        .edge(
            Readability,
            Edge::conditional(route_readability, &[("ok", Aggregate), ("revise", Revise)]),
        )
        .edge(Revise, Edge::always(Readability))
        .edge(Aggregate, Edge::End)
        .build()
}

/// The structured-answer pipeline.
pub struct StructuredAnswer {
    graph: Arc<Graph<AnswerStep>>,
}

impl StructuredAnswer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            graph: Arc::new(build_graph()?),
        })
    }

    fn seed(request: &PipelineRequest) -> Result<GraphState> {
        let patch = request
            .seed()?
            .set_value(RESPONSE, Value::Null)
            .set(NUM_ITERATIONS, &0u32)?;
        GraphState::seeded(patch)
    }
}

impl Pipeline for StructuredAnswer {
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

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use svarflyt_core::event::ProgressSink;
    use svarflyt_core::SvarflytError;
    use svarflyt_test_utils::{model_config, response_with_scores, MockLlm, MockQueryEngine, MockReply};

    const HARD: &str = "Forsikringsvilkårene spesifiserer omfattende begrensninger vedrørende erstatningsutbetalinger";
    const EASY: &str = "Du får penger. Det går fort.";

    fn request(cutoff: f64) -> PipelineRequest {
        PipelineRequest {
            query: "Hva dekker reiseforsikringen?".into(),
            similarity_cutoff: cutoff,
            vector_index_description: "Jeg kan svare på spørsmål om forsikring".into(),
        }
    }

    /// Title and summary get fixed replies; revisions return `revision`.
    fn llm(revision: &'static str) -> MockLlm {
        MockLlm::with_handler(move |messages| {
            let prompt = &messages[0].content;
            if prompt.starts_with("Gi en kort tittel") {
                MockReply::text("T")
            } else if prompt.starts_with("Oppsummer") {
                MockReply::text("S")
            } else {
                MockReply::text(revision)
            }
        })
    }

    fn context(llm: MockLlm, engine: MockQueryEngine) -> (NodeContext, tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sink, rx) = ProgressSink::channel();
        let collaborators = Collaborators::new(Arc::new(llm), model_config(), Arc::new(engine));
        (NodeContext::new(Arc::new(collaborators), sink), rx)
    }

    async fn run(llm: MockLlm, engine: MockQueryEngine, cutoff: f64) -> Result<GraphState> {
        let pipeline = StructuredAnswer::new().unwrap();
        let (ctx, _rx) = context(llm, engine);
        pipeline
            .graph
            .run(StructuredAnswer::seed(&request(cutoff))?, &ctx)
            .await
    }

    #[tokio::test]
    async fn test_rejected_returns_apology_without_llm_calls() {
        let llm = llm(EASY);
        let engine = MockQueryEngine::new().with_fallback(response_with_scores(EASY, &[0.1, 0.3]));
        let pipeline = StructuredAnswer::new().unwrap();
        let (ctx, mut rx) = context(llm.clone(), engine);

        let answer = pipeline.invoke(&request(0.5), &ctx).await.unwrap();
        let description = "Jeg kan svare på spørsmål om forsikring";
        assert_eq!(answer, apology(description));
        assert_eq!(answer.matches(description).count(), 1);
        assert!(llm.calls().is_empty());

        drop(ctx);
        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert_eq!(events.last(), Some(&ProgressEvent::FinalAnswer(answer)));
    }

    #[tokio::test]
    async fn test_accepted_easy_answer_needs_no_revision() {
        let llm = llm(EASY);
        let engine = MockQueryEngine::new().with_fallback(response_with_scores(EASY, &[0.9, 0.4, 0.95]));
        let state = run(llm.clone(), engine, 0.5).await.unwrap();

        assert_eq!(state.get::<u32>(NUM_ITERATIONS).unwrap(), 0);
        assert_eq!(state.get_str(READABLE_OR_NOT), Some("readable"));
        assert_eq!(state.get_str(FEEDBACK), Some(NO_FEEDBACK));
        assert_eq!(state.get::<Vec<Reference>>(REFERENCES).unwrap().len(), 2);
        // Title and summary only.
        assert_eq!(llm.calls().len(), 2);

        let report: String = state.get(FINAL_ANSWER).unwrap();
        assert!(report.contains("## Tittel\nT\n\n"));
        assert!(report.contains("## Sammendrag\nS\n\n"));
        assert!(report.contains("- [Doc 2](https://example.no/2) (Relevans: 0.95)"));
    }

    #[tokio::test]
    async fn test_revision_loop_stops_after_four_passes() {
        let llm = llm(HARD);
        let engine = MockQueryEngine::new().with_fallback(response_with_scores(HARD, &[0.9]));
        let state = run(llm.clone(), engine, 0.5).await.unwrap();

        let revisions = llm
            .calls()
            .iter()
            .filter(|c| c.prompt().starts_with("Improve readability"))
            .count();
        assert_eq!(revisions, 4);
        assert_eq!(state.get::<u32>(NUM_ITERATIONS).unwrap(), 4);
        assert!(state.get::<f64>(LIX_SCORE).unwrap() > 35.0);
        assert_eq!(state.get_str(READABLE_OR_NOT), Some("readable"));
    }

    #[tokio::test]
    async fn test_revision_loop_exits_once_readable() {
        let llm = llm(EASY);
        let engine = MockQueryEngine::new().with_fallback(response_with_scores(HARD, &[0.9]));
        let state = run(llm.clone(), engine, 0.5).await.unwrap();

        assert_eq!(state.get::<u32>(NUM_ITERATIONS).unwrap(), 1);
        assert_eq!(state.get_str(ANSWER), Some(EASY));
        let revise_call = llm
            .calls()
            .into_iter()
            .find(|c| c.prompt().starts_with("Improve readability"))
            .unwrap();
        assert_eq!(
            revise_call.prompt(),
            format!("Improve readability: {}. Feedback: {}", HARD, REVISE_FEEDBACK)
        );
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let engine = MockQueryEngine::new().failing("index offline");
        let err = run(llm(EASY), engine, 0.5).await.unwrap_err();
        assert!(matches!(err, SvarflytError::QueryBackend(_)));
    }

    #[tokio::test]
    async fn test_stream_ends_with_final_answer_then_completion() {
        let engine = MockQueryEngine::new().with_fallback(response_with_scores(EASY, &[0.9]));
        let collaborators = Arc::new(Collaborators::new(
            Arc::new(llm(EASY)),
            model_config(),
            Arc::new(engine),
        ));
        let events: Vec<RunEvent> = StructuredAnswer::new()
            .unwrap()
            .stream(&request(0.5), collaborators)
            .collect()
            .await;

        assert!(matches!(
            &events[0],
            RunEvent::Progress(ProgressEvent::Action(a)) if a == "Calling llm to get the initial answer"
        ));
        let n = events.len();
        assert!(matches!(&events[n - 2], RunEvent::Progress(ProgressEvent::FinalAnswer(a)) if a.starts_with("# Oppsummering")));
        assert!(matches!(&events[n - 1], RunEvent::Completed(_)));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let response = response_with_scores("svar", &[0.2, 0.6]);
        assert_eq!(validate(&response, 0.5), Validation::Accepted);
        assert_eq!(validate(&response, 0.5), validate(&response, 0.5));
        assert_eq!(validate(&response, 0.7), Validation::Rejected);
    }

    #[test]
    fn test_render_report_sections_and_rounding() {
        let refs = vec![Reference {
            name: "X".into(),
            url: "u".into(),
            relevance_index: 0.8123,
        }];
        let report = render_report("Q", "T", "S", "A", &refs);
        assert_eq!(
            report,
            "# Oppsummering av spørsmålet\n\n\
             ## Spørsmålet\nQ\n\n\
             ## Tittel\nT\n\n\
             ## Sammendrag\nS\n\n\
             ## Svar\nA\n\n\
             ## Referanser\n\
             - [X](u) (Relevans: 0.81)\n"
        );
    }

    #[test]
    fn test_render_report_omits_empty_references() {
        let report = render_report("Q", "T", "S", "A", &[]);
        assert!(!report.contains("Referanser"));
        assert!(report.ends_with("## Svar\nA\n\n"));
    }
}
