use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use svarflyt_core::error::{Result, SvarflytError};

use super::node::NodeContext;
use super::state::{GraphState, StatePatch};

/// One unit of fan-out work: a private item plus read-only shared fields.
#[derive(Debug)]
pub struct WorkItem<'a> {
    /// Position in the list; the slot this worker fills.
    pub index: usize,
    pub item: Value,
    pub shared: &'a GraphState,
}

impl WorkItem<'_> {
    /// Decode the private item.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.item).map_err(|e| SvarflytError::FieldType {
            field: format!("item[{}]", self.index),
            message: e.to_string(),
        })
    }
}

/// Fills one item. Returns the item with its fields set.
pub trait Worker: Send + Sync + 'static {
    fn run<'a>(&'a self, item: WorkItem<'a>, ctx: &'a NodeContext) -> BoxFuture<'a, Result<Value>>;
}

impl<F> Worker for F
where
    F: for<'a> Fn(WorkItem<'a>, &'a NodeContext) -> BoxFuture<'a, Result<Value>>
        + Send
        + Sync
        + 'static,
{
    fn run<'a>(&'a self, item: WorkItem<'a>, ctx: &'a NodeContext) -> BoxFuture<'a, Result<Value>> {
        self(item, ctx)
    }
}

/// Run `worker` once per item, all concurrently.
///
/// Returns one slot per item in spawn order. Every worker runs to
/// completion before this returns; if any failed, the error of the lowest
/// failing index is returned and no slot is handed out.
pub async fn fan_out(
    worker: &dyn Worker,
    items: Vec<Value>,
    shared: &GraphState,
    ctx: &NodeContext,
) -> Result<Vec<Option<Value>>> {
    let mut slots: Vec<Option<Value>> = vec![None; items.len()];

    let tasks = items.into_iter().enumerate().map(|(index, item)| async move {
        let result = worker.run(WorkItem { index, item, shared }, ctx).await;
        (index, result)
    });

    let mut first_error = None;
    for (index, result) in join_all(tasks).await {
        match result {
            Ok(value) => slots[index] = Some(value),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(e) => debug!(index, error = %e, "Additional fan-out failure"),
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(slots),
    }
}

/// Fan-in barrier: every slot must be filled.
pub fn join(slots: Vec<Option<Value>>) -> Result<Vec<Value>> {
    let expected = slots.len();
    let filled: Vec<Value> = slots.into_iter().flatten().collect();
    if filled.len() != expected {
        return Err(SvarflytError::JoinIncomplete {
            filled: filled.len(),
            expected,
        });
    }
    Ok(filled)
}

/// A node that fans out over the list stored at `items_key`.
///
/// Workers only see their own item and a copy of the `shared_keys`
/// fields. The filled list replaces the original in one patch.
pub struct FanOut {
    items_key: &'static str,
    shared_keys: Vec<&'static str>,
    worker: Arc<dyn Worker>,
}

impl FanOut {
    pub fn new(items_key: &'static str, worker: impl Worker) -> Self {
        Self {
            items_key,
            shared_keys: Vec::new(),
            worker: Arc::new(worker),
        }
    }

    /// Fields copied into every worker's read-only view.
    pub fn sharing(mut self, keys: &[&'static str]) -> Self {
        self.shared_keys = keys.to_vec();
        self
    }

    pub async fn dispatch(&self, state: &GraphState, ctx: &NodeContext) -> Result<StatePatch> {
        let items: Vec<Value> = state.get(self.items_key)?;
        let shared = state.slice(&self.shared_keys);
        let count = items.len();
        let start = Instant::now();

        debug!(items_key = self.items_key, items = count, "Fanning out");
        let slots = fan_out(self.worker.as_ref(), items, &shared, ctx).await?;
        let filled = join(slots)?;
        debug!(
            items_key = self.items_key,
            items = count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fan-in complete"
        );

        Ok(StatePatch::new().set_value(self.items_key, Value::Array(filled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_context;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    fn double<'a>(item: WorkItem<'a>, _: &'a NodeContext) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let n: i64 = item.decode()?;
            let factor = item.shared.get::<i64>("factor").unwrap_or(2);
            Ok(json!(n * factor))
        })
    }

    fn fail_on_odd<'a>(item: WorkItem<'a>, _: &'a NodeContext) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let n: i64 = item.decode()?;
            if n % 2 == 1 {
                return Err(SvarflytError::QueryBackend(format!("odd {}", n)));
            }
            Ok(json!(n))
        })
    }

    #[tokio::test]
    async fn test_slots_follow_spawn_order() {
        let ctx = test_context();
        let items = vec![json!(1), json!(2), json!(3)];
        let slots = fan_out(&double, items, &GraphState::new(), &ctx).await.unwrap();
        assert_eq!(join(slots).unwrap(), vec![json!(2), json!(4), json!(6)]);
    }

    #[tokio::test]
    async fn test_zero_items_joins_trivially() {
        let ctx = test_context();
        let slots = fan_out(&double, Vec::new(), &GraphState::new(), &ctx).await.unwrap();
        assert!(join(slots).unwrap().is_empty());
    }

    struct BarrierWorker(Arc<Barrier>);

    impl Worker for BarrierWorker {
        fn run<'a>(&'a self, item: WorkItem<'a>, _: &'a NodeContext) -> BoxFuture<'a, Result<Value>> {
            Box::pin(async move {
                self.0.wait().await;
                Ok(item.item)
            })
        }
    }

    struct CountingWorker(Arc<AtomicUsize>);

    impl Worker for CountingWorker {
        fn run<'a>(&'a self, item: WorkItem<'a>, ctx: &'a NodeContext) -> BoxFuture<'a, Result<Value>> {
            Box::pin(async move {
                let result = fail_on_odd(item, ctx).await;
                self.0.fetch_add(1, Ordering::SeqCst);
                result
            })
        }
    }

    #[tokio::test]
    async fn test_workers_run_concurrently() {
        // Each worker blocks on the barrier until all three are in flight.
        let worker = BarrierWorker(Arc::new(Barrier::new(3)));
        let ctx = test_context();
        let items = vec![json!("a"), json!("b"), json!("c")];
        let slots = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            fan_out(&worker, items, &GraphState::new(), &ctx),
        )
        .await
        .expect("workers did not run concurrently")
        .unwrap();
        assert_eq!(join(slots).unwrap(), vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn test_failure_waits_for_all_workers() {
        let finished = Arc::new(AtomicUsize::new(0));
        let worker = CountingWorker(finished.clone());
        let ctx = test_context();
        let items = vec![json!(2), json!(3), json!(4), json!(5)];
        let err = fan_out(&worker, items, &GraphState::new(), &ctx).await.unwrap_err();

        assert!(matches!(err, SvarflytError::QueryBackend(ref m) if m == "odd 3"));
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_join_rejects_unfilled_slot() {
        let err = join(vec![Some(json!(1)), None]).unwrap_err();
        assert!(matches!(err, SvarflytError::JoinIncomplete { filled: 1, expected: 2 }));
    }

    #[tokio::test]
    async fn test_dispatch_writes_list_back_with_shared_view() {
        let node = FanOut::new("numbers", double).sharing(&["factor"]);
        let state = GraphState::seeded(
            StatePatch::new()
                .set("numbers", &[1, 2])
                .unwrap()
                .set("factor", &10)
                .unwrap()
                .set("unrelated", "x")
                .unwrap(),
        )
        .unwrap();

        let patch = node.dispatch(&state, &test_context()).await.unwrap();
        assert_eq!(patch.keys().collect::<Vec<_>>(), vec!["numbers"]);

        let mut state = state;
        state.merge(patch).unwrap();
        assert_eq!(state.get::<Vec<i64>>("numbers").unwrap(), vec![10, 20]);
    }
}
