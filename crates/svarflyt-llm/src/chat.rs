use futures::StreamExt;

use svarflyt_core::config::ModelConfig;
use svarflyt_core::error::Result;
use svarflyt_core::traits::LlmClient;
use svarflyt_core::types::{ChatMessage, StreamDelta};

/// Send `messages` and collect the streamed text into one string.
pub async fn invoke(
    llm: &dyn LlmClient,
    config: &ModelConfig,
    messages: Vec<ChatMessage>,
) -> Result<String> {
    let mut stream = llm.chat_stream(config, messages, &[]).await?;
    let mut content = String::new();
    while let Some(delta) = stream.next().await {
        if let StreamDelta::TextDelta(text) = delta? {
            content.push_str(&text);
        }
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use svarflyt_test_utils::{model_config, MockLlm, MockReply};

    #[tokio::test]
    async fn test_invoke_collects_text() {
        let llm = MockLlm::scripted(vec![MockReply::text("Kort tittel")]);
        let out = invoke(&llm, &model_config(), vec![ChatMessage::user("q")])
            .await
            .unwrap();
        assert_eq!(out, "Kort tittel");
        assert_eq!(llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_propagates_request_error() {
        let llm = MockLlm::scripted(vec![MockReply::Fail("HTTP 500".into())]);
        let err = invoke(&llm, &model_config(), vec![ChatMessage::user("q")]).await;
        assert!(err.is_err());
    }
}
