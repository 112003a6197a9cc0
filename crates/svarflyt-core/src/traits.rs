use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// LLM client: streaming chat completion.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Retrieval-augmented query backend.
pub trait QueryEngine: Send + Sync + 'static {
    /// Answer `text` and return the scored results the answer was built from.
    fn query<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<QueryResponse>>;

    /// Whether the backend has its indexes loaded and can serve queries.
    fn health(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
