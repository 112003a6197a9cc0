//! Mock collaborators and fixtures shared by the svarflyt test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use svarflyt_core::config::ModelConfig;
use svarflyt_core::error::{Result, SvarflytError};
use svarflyt_core::traits::{LlmClient, QueryEngine};
use svarflyt_core::types::*;

/// Model config pointing nowhere; mocks ignore it.
pub fn model_config() -> ModelConfig {
    ModelConfig {
        provider: "openai".into(),
        model_id: "mock-model".into(),
        api_key: None,
        base_url: None,
        max_tokens: 512,
        temperature: 0.0,
    }
}

/// A query response whose source nodes carry `scores`, titled `Doc {i}`
/// with url `https://example.no/{i}`.
pub fn response_with_scores(text: &str, scores: &[f64]) -> QueryResponse {
    QueryResponse {
        response: text.to_string(),
        source_nodes: scores
            .iter()
            .enumerate()
            .map(|(i, s)| {
                SourceNode::scored(*s)
                    .with_title(format!("Doc {}", i))
                    .with_url(format!("https://example.no/{}", i))
            })
            .collect(),
    }
}

// ── Mock LLM ────────────────────────────────────────────────────

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Tool {
        name: String,
        arguments: serde_json::Value,
    },
    Fail(String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn tool(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::Tool {
            name: name.into(),
            arguments,
        }
    }
}

/// A request the mock received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    /// Names of the tools offered.
    pub tools: Vec<String>,
}

impl RecordedCall {
    /// All message contents joined with newlines.
    pub fn prompt(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

type Handler = dyn Fn(&[ChatMessage]) -> MockReply + Send + Sync;

/// LLM that replays scripted replies in order, then falls back to a handler.
#[derive(Clone)]
pub struct MockLlm {
    script: Arc<Mutex<VecDeque<MockReply>>>,
    handler: Option<Arc<Handler>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockLlm {
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(replies.into())),
            handler: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer every request by calling `handler` with the messages.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> MockReply + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            handler: Some(Arc::new(handler)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self, messages: &[ChatMessage]) -> MockReply {
        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.handler {
            Some(handler) => handler(messages),
            None => MockReply::Fail("MockLlm: no scripted reply left".into()),
        }
    }
}

impl LlmClient for MockLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let reply = self.next_reply(&messages);
        self.calls.lock().unwrap().push(RecordedCall {
            messages,
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });

        Box::pin(async move {
            let deltas: Vec<Result<StreamDelta>> = match reply {
                MockReply::Text(text) => vec![
                    Ok(StreamDelta::TextDelta(text)),
                    Ok(StreamDelta::Stop(StopReason::EndTurn)),
                ],
                MockReply::Tool { name, arguments } => vec![
                    Ok(StreamDelta::ToolUseStart {
                        index: 0,
                        id: "call_0".into(),
                        name,
                    }),
                    Ok(StreamDelta::ToolInputDelta {
                        index: 0,
                        delta: arguments.to_string(),
                    }),
                    Ok(StreamDelta::Stop(StopReason::ToolUse)),
                ],
                MockReply::Fail(message) => return Err(SvarflytError::LlmRequest(message)),
            };
            Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

// ── Mock query engine ───────────────────────────────────────────

/// Query engine answering from a table of canned responses.
#[derive(Clone, Default)]
pub struct MockQueryEngine {
    responses: Arc<Mutex<HashMap<String, QueryResponse>>>,
    fallback: Option<QueryResponse>,
    failing: Option<String>,
    ready: Option<bool>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockQueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with `response`.
    pub fn with_response(self, query: impl Into<String>, response: QueryResponse) -> Self {
        self.responses.lock().unwrap().insert(query.into(), response);
        self
    }

    /// Answer any query without a canned response with `response`.
    pub fn with_fallback(mut self, response: QueryResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    /// Fail every query with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failing = Some(message.into());
        self
    }

    /// Report the backend as still loading.
    pub fn not_ready(mut self) -> Self {
        self.ready = Some(false);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl QueryEngine for MockQueryEngine {
    fn query<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<QueryResponse>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(text.to_string());
            if let Some(message) = &self.failing {
                return Err(SvarflytError::QueryBackend(message.clone()));
            }
            let canned = self.responses.lock().unwrap().get(text).cloned();
            canned
                .or_else(|| self.fallback.clone())
                .ok_or_else(|| SvarflytError::QueryBackend(format!("no mock response for '{}'", text)))
        })
    }

    fn health(&self) -> BoxFuture<'_, Result<()>> {
        let ready = self.ready.unwrap_or(true);
        Box::pin(async move {
            if ready {
                Ok(())
            } else {
                Err(SvarflytError::NotReady("indexes loading".into()))
            }
        })
    }
}
