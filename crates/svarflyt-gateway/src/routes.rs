use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{error, info};

use svarflyt_agent::{NodeContext, PipelineRequest, RunEvent};
use svarflyt_core::event::ProgressSink;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /chat` and `POST /chat/stream`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub agent: String,
    #[serde(default)]
    pub similarity_cutoff: Option<f64>,
    #[serde(default)]
    pub vector_index_description: Option<String>,
}

impl ChatRequest {
    fn into_pipeline_request(self, state: &AppState) -> (String, PipelineRequest) {
        let request = PipelineRequest {
            query: self.query,
            similarity_cutoff: self
                .similarity_cutoff
                .unwrap_or(state.defaults.similarity_cutoff),
            vector_index_description: self
                .vector_index_description
                .unwrap_or_else(|| state.defaults.vector_index_description.clone()),
        };
        (self.agent, request)
    }
}

/// Readiness, then body, in that order.
fn admit(state: &AppState, body: &[u8]) -> Result<ChatRequest, ApiError> {
    if !state.is_ready() {
        return Err(ApiError::NotReady);
    }
    let request: ChatRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request: {}", e)))?;
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".to_string()));
    }
    Ok(request)
}

// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "ready": state.is_ready(),
        "agents": state.registry.names(),
    }))
}

// POST /chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (agent, request) = admit(&state, &body)?.into_pipeline_request(&state);
    let pipeline = state.registry.get(&agent)?;
    info!(agent = %agent, cutoff = request.similarity_cutoff, "Chat request");

    let ctx = NodeContext::new(state.collaborators.clone(), ProgressSink::disabled());
    match pipeline.invoke(&request, &ctx).await {
        Ok(answer) => Ok(Json(serde_json::json!({ "answer": answer }))),
        Err(e) => {
            error!(agent = %agent, error = %e, "Error in /chat handler");
            Err(e.into())
        }
    }
}

// POST /chat/stream
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (agent, request) = admit(&state, &body)?.into_pipeline_request(&state);
    let pipeline = state.registry.get(&agent)?;
    info!(agent = %agent, cutoff = request.similarity_cutoff, "Streaming chat request");

    let events = pipeline
        .stream(&request, state.collaborators.clone())
        .filter_map(move |event| {
            let data = match event {
                RunEvent::Progress(progress) => serde_json::to_string(&progress).ok(),
                RunEvent::Completed(_) => None,
                RunEvent::Failed(e) => {
                    error!(agent = %agent, error = %e, "Error in /chat/stream handler");
                    Some(serde_json::json!({ "error": e.to_string() }).to_string())
                }
            };
            futures::future::ready(data.map(|d| Ok(Event::default().data(d))))
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
