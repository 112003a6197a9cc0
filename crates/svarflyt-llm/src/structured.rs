use std::collections::BTreeMap;
use std::marker::PhantomData;

use futures::StreamExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::debug;

use svarflyt_core::config::ModelConfig;
use svarflyt_core::error::{Result, SvarflytError};
use svarflyt_core::traits::LlmClient;
use svarflyt_core::types::{ChatMessage, StreamDelta, ToolDefinition};

/// Requests a `T` from the model instead of free text.
///
/// The JSON Schema of `T` is offered as a single function tool; the
/// streamed call arguments are decoded into `T`. Models that answer with
/// plain JSON text instead of a tool call are accepted too.
pub struct StructuredOutput<T> {
    tool: ToolDefinition,
    _marker: PhantomData<fn() -> T>,
}

/// Build a structured-output adapter for `T`.
pub fn with_structured_output<T>() -> Result<StructuredOutput<T>>
where
    T: JsonSchema + DeserializeOwned,
{
    let mut schema = serde_json::to_value(schemars::schema_for!(T))?;
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    Ok(StructuredOutput {
        tool: ToolDefinition {
            name: T::schema_name().into_owned(),
            description: "Return the result in this exact structure.".to_string(),
            input_schema: schema,
        },
        _marker: PhantomData,
    })
}

impl<T: DeserializeOwned> StructuredOutput<T> {
    pub fn tool(&self) -> &ToolDefinition {
        &self.tool
    }

    pub async fn invoke(
        &self,
        llm: &dyn LlmClient,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> Result<T> {
        let mut stream = llm
            .chat_stream(config, messages, std::slice::from_ref(&self.tool))
            .await?;

        let mut text = String::new();
        let mut names: BTreeMap<usize, String> = BTreeMap::new();
        let mut arguments: BTreeMap<usize, String> = BTreeMap::new();

        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::TextDelta(t) => text.push_str(&t),
                StreamDelta::ToolUseStart { index, name, .. } => {
                    names.insert(index, name);
                }
                StreamDelta::ToolInputDelta { index, delta } => {
                    arguments.entry(index).or_default().push_str(&delta);
                }
                _ => {}
            }
        }

        let call = arguments
            .iter()
            .find(|(index, _)| names.get(index).is_some_and(|n| *n == self.tool.name))
            .or_else(|| arguments.iter().next())
            .map(|(_, args)| args.as_str());

        let raw = match call {
            Some(args) => args,
            None => {
                debug!(tool = %self.tool.name, "No tool call in response, parsing text");
                strip_code_fence(&text)
            }
        };

        serde_json::from_str(raw).map_err(|e| {
            SvarflytError::LlmParse(format!("{} for {}: {}", e, self.tool.name, raw))
        })
    }
}

/// Strip a surrounding markdown code fence (```json ... ```), if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
