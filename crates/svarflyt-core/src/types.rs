use serde::{Deserialize, Serialize};

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to the language model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// Start of a tool call block.
    ToolUseStart {
        index: usize,
        id: String,
        name: String,
    },

    /// A chunk of tool call argument JSON.
    ToolInputDelta { index: usize, delta: String },

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Function definition offered to the LLM. Structured output is requested
/// by offering exactly one of these with the target type's JSON Schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Metadata attached to a retrieved source node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// One scored result from the query backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceNode {
    /// Similarity score. Absent scores never match a threshold.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl SourceNode {
    pub fn scored(score: f64) -> Self {
        Self {
            score: Some(score),
            metadata: NodeMetadata::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.metadata.url = Some(url.into());
        self
    }

    /// Whether this node's score meets or exceeds `cutoff`.
    pub fn meets(&self, cutoff: f64) -> bool {
        self.score.is_some_and(|s| s >= cutoff)
    }
}

/// A query backend answer together with the scored results it was built from.
/// `source_nodes` keeps the backend's ordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub response: String,
    #[serde(default)]
    pub source_nodes: Vec<SourceNode>,
}

impl QueryResponse {
    /// True if at least one scored result meets `cutoff`.
    pub fn has_match(&self, cutoff: f64) -> bool {
        self.source_nodes.iter().any(|n| n.meets(cutoff))
    }
}

/// A cited source in a final answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    pub name: String,
    pub url: String,
    pub relevance_index: f64,
}

/// Outcome of answering a single subquery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseValidity {
    Valid,
    NotValid,
}

/// One part of a decomposed user query.
///
/// Planned with only `subquery` set; the worker assigned to it fills the
/// rest exactly once.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubQuery {
    pub subquery: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub response_validity: Option<ResponseValidity>,
}

impl SubQuery {
    pub fn planned(text: impl Into<String>) -> Self {
        Self {
            subquery: text.into(),
            ..Self::default()
        }
    }
}
