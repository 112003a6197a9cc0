use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use futures::stream::{self, BoxStream, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use svarflyt_core::error::{Result, SvarflytError};
use svarflyt_core::event::{ProgressEvent, ProgressSink};

use super::edge::Edge;
use super::fanout::FanOut;
use super::node::{Collaborators, NodeContext, NodeKey, NodeKind, Step};
use super::state::{GraphState, StatePatch};

/// Item of a streaming run: progress while it runs, then exactly one
/// terminal `Completed` or `Failed`.
#[derive(Debug)]
pub enum RunEvent {
    Progress(ProgressEvent),
    Completed(GraphState),
    Failed(SvarflytError),
}

/// A validated, immutable step graph.
///
/// Built once per pipeline and shared across runs; all per-run data lives
/// in the `GraphState` handed to `run`.
pub struct Graph<K: NodeKey> {
    name: &'static str,
    entry: K,
    nodes: HashMap<K, NodeKind>,
    edges: HashMap<K, Edge<K>>,
}

impl<K: NodeKey> Graph<K> {
    pub fn builder(name: &'static str) -> GraphBuilder<K> {
        GraphBuilder::new(name)
    }

    /// Walk the graph from the entry node to the `End` edge.
    ///
    /// Each node's patch is merged only if the node succeeded. The first
    /// error aborts the run and is returned as-is.
    pub async fn run(&self, mut state: GraphState, ctx: &NodeContext) -> Result<GraphState> {
        let run_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        info!(graph = self.name, run_id = %run_id, "Graph run started");

        let mut current = self.entry;
        let mut steps = 0usize;

        let result = loop {
            steps += 1;
            let patch = match self.invoke(current, &state, ctx, &run_id).await {
                Ok(patch) => patch,
                Err(e) => break Err(e),
            };
            if let Err(e) = state.merge(patch) {
                break Err(e);
            }

            match self.next(current, &mut state, ctx, &run_id).await {
                Ok(Some(next)) => current = next,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                info!(graph = self.name, run_id = %run_id, steps, elapsed_ms, "Graph run complete");
                Ok(state)
            }
            Err(e) => {
                warn!(
                    graph = self.name,
                    run_id = %run_id,
                    node = current.name(),
                    error = %e,
                    elapsed_ms,
                    "Graph run failed"
                );
                Err(e)
            }
        }
    }

    /// Run on a background task and stream progress followed by the outcome.
    pub fn run_streaming(
        self: Arc<Self>,
        state: GraphState,
        collaborators: Arc<Collaborators>,
    ) -> BoxStream<'static, RunEvent> {
        let (progress, rx) = ProgressSink::channel();
        let ctx = NodeContext::new(collaborators, progress);

        // The context holds the only sender; progress ends when the run does.
        let handle = tokio::spawn(async move { self.run(state, &ctx).await });

        let outcome = stream::once(async move {
            match handle.await {
                Ok(Ok(state)) => RunEvent::Completed(state),
                Ok(Err(e)) => RunEvent::Failed(e),
                Err(e) => RunEvent::Failed(SvarflytError::Graph(format!("run task aborted: {}", e))),
            }
        });

        UnboundedReceiverStream::new(rx)
            .map(RunEvent::Progress)
            .chain(outcome)
            .boxed()
    }

    /// Follow the outgoing edge of `from`. Parallel branches are run and
    /// merged here, so the returned node is always the next one to invoke.
    async fn next(
        &self,
        from: K,
        state: &mut GraphState,
        ctx: &NodeContext,
        run_id: &str,
    ) -> Result<Option<K>> {
        let edge = self
            .edges
            .get(&from)
            .ok_or_else(|| SvarflytError::Graph(format!("node '{}' has no edge", from.name())))?;

        match edge {
            Edge::Always(to) => Ok(Some(*to)),
            Edge::Conditional { .. } => {
                let (branch, to) = edge.route(from, state)?.ok_or_else(|| {
                    SvarflytError::Graph(format!("node '{}' has no router", from.name()))
                })?;
                debug!(run_id, node = from.name(), branch, next = to.name(), "Branch selected");
                Ok(Some(to))
            }
            Edge::Parallel { branches, join } => {
                debug!(run_id, node = from.name(), branches = branches.len(), "Parallel split");
                let snapshot: &GraphState = state;
                let results =
                    join_all(branches.iter().map(|b| self.invoke(*b, snapshot, ctx, run_id))).await;

                // All branches must succeed before any of them is committed.
                let mut combined = StatePatch::new();
                for patch in results {
                    combined = combined.extend(patch?);
                }
                state.merge(combined)?;
                Ok(Some(*join))
            }
            Edge::End => Ok(None),
        }
    }

    async fn invoke(
        &self,
        key: K,
        state: &GraphState,
        ctx: &NodeContext,
        run_id: &str,
    ) -> Result<StatePatch> {
        let node = self
            .nodes
            .get(&key)
            .ok_or_else(|| SvarflytError::Graph(format!("node '{}' not found", key.name())))?;

        let start = Instant::now();
        let patch = match node {
            NodeKind::Step(step) => step.run(state, ctx).await?,
            NodeKind::FanOut(fan_out) => fan_out.dispatch(state, ctx).await?,
        };
        debug!(
            run_id,
            node = key.name(),
            fields = patch.keys().collect::<Vec<_>>().join(","),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Node complete"
        );
        Ok(patch)
    }
}

/// Assembles and validates a `Graph`.
pub struct GraphBuilder<K: NodeKey> {
    name: &'static str,
    entry: Option<K>,
    nodes: HashMap<K, NodeKind>,
    edges: HashMap<K, Edge<K>>,
    problems: Vec<String>,
}

impl<K: NodeKey> GraphBuilder<K> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entry: None,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            problems: Vec::new(),
        }
    }

    pub fn entry(mut self, key: K) -> Self {
        self.entry = Some(key);
        self
    }

    pub fn step(self, key: K, step: impl Step) -> Self {
        self.node(key, NodeKind::Step(Arc::new(step)))
    }

    pub fn fan_out(self, key: K, fan_out: FanOut) -> Self {
        self.node(key, NodeKind::FanOut(fan_out))
    }

    /// Set the outgoing edge of `from`. A node has at most one.
    pub fn edge(mut self, from: K, edge: Edge<K>) -> Self {
        if self.edges.insert(from, edge).is_some() {
            self.problems.push(format!("node '{}' has more than one edge", from.name()));
        }
        self
    }

    fn node(mut self, key: K, kind: NodeKind) -> Self {
        if self.nodes.insert(key, kind).is_some() {
            self.problems.push(format!("node '{}' added twice", key.name()));
        }
        self
    }

    /// Check the wiring and freeze the graph.
    ///
    /// Every edge must connect known nodes, exactly one `End` must exist,
    /// and every node needs an edge except parallel branch nodes, which
    /// return to the split and must have none.
    pub fn build(self) -> Result<Graph<K>> {
        let mut problems = self.problems;

        let entry = match self.entry {
            Some(entry) if self.nodes.contains_key(&entry) => Some(entry),
            Some(entry) => {
                problems.push(format!("entry node '{}' not found", entry.name()));
                None
            }
            None => {
                problems.push("no entry node".to_string());
                None
            }
        };

        let mut branch_nodes = Vec::new();
        let mut ends = 0;
        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                problems.push(format!("edge from unknown node '{}'", from.name()));
            }
            for to in edge.targets() {
                if !self.nodes.contains_key(&to) {
                    problems.push(format!(
                        "edge from '{}' to unknown node '{}'",
                        from.name(),
                        to.name()
                    ));
                }
            }
            match edge {
                Edge::Parallel { branches, .. } => branch_nodes.extend(branches.iter().copied()),
                Edge::End => ends += 1,
                _ => {}
            }
        }

        if ends != 1 {
            problems.push(format!("expected exactly one End edge, found {}", ends));
        }

        for key in self.nodes.keys() {
            let is_branch = branch_nodes.contains(key);
            let has_edge = self.edges.contains_key(key);
            if is_branch && has_edge {
                problems.push(format!("parallel branch '{}' must not have an edge", key.name()));
            } else if !is_branch && !has_edge {
                problems.push(format!("node '{}' has no edge", key.name()));
            }
        }

        match entry {
            Some(entry) if problems.is_empty() => Ok(Graph {
                name: self.name,
                entry,
                nodes: self.nodes,
                edges: self.edges,
            }),
            _ => {
                problems.sort();
                Err(SvarflytError::Graph(format!(
                    "{}: {}",
                    self.name,
                    problems.join("; ")
                )))
            }
        }
    }
}
