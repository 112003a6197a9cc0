use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use svarflyt_agent::{AgentRegistry, Collaborators};
use svarflyt_core::config::PipelineConfig;

/// Shared application state for axum handlers.
pub struct AppState {
    pub collaborators: Arc<Collaborators>,
    pub registry: Arc<AgentRegistry>,
    /// Cutoff and description used when a request leaves them out.
    pub defaults: PipelineConfig,
    ready: AtomicBool,
}

impl AppState {
    pub fn new(
        collaborators: Arc<Collaborators>,
        registry: Arc<AgentRegistry>,
        defaults: PipelineConfig,
    ) -> Self {
        Self {
            collaborators,
            registry,
            defaults,
            ready: AtomicBool::new(false),
        }
    }

    /// Whether the query backend has its indexes loaded.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }
}
