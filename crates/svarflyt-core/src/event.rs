use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// A progress event pushed by a pipeline step.
///
/// Serializes as `{"action": "..."}` or `{"final_answer": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    Action(String),
    FinalAnswer(String),
}

impl ProgressEvent {
    pub fn action(text: impl Into<String>) -> Self {
        Self::Action(text.into())
    }
}

/// Out-of-band progress channel handed to every step.
///
/// Best-effort: events are dropped when nobody listens. Events from
/// concurrent branches interleave in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// A sink that only logs.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create a sink and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: ProgressEvent) {
        debug!(?event, "progress");
        if let Some(tx) = &self.tx {
            // Ignore error if the receiver is gone
            let _ = tx.send(event);
        }
    }

    pub fn action(&self, text: impl Into<String>) {
        self.emit(ProgressEvent::action(text));
    }
}
