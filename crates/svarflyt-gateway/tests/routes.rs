use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use svarflyt_agent::{AgentRegistry, Collaborators, STRUCTURED_ANSWER, SUBQUERY_ORCHESTRATOR};
use svarflyt_core::config::PipelineConfig;
use svarflyt_gateway::{router, spawn_readiness_probe, AppState};
use svarflyt_test_utils::{model_config, response_with_scores, MockLlm, MockQueryEngine, MockReply};

fn state(llm: MockLlm, engine: MockQueryEngine, ready: bool) -> Arc<AppState> {
    let collaborators = Arc::new(Collaborators::new(
        Arc::new(llm),
        model_config(),
        Arc::new(engine),
    ));
    let registry = Arc::new(AgentRegistry::with_defaults().unwrap());
    let defaults = PipelineConfig {
        similarity_cutoff: 0.5,
        vector_index_description: "Jeg svarer på spørsmål om forsikring".into(),
    };
    let state = Arc::new(AppState::new(collaborators, registry, defaults));
    if ready {
        state.mark_ready();
    }
    state
}

fn app(llm: MockLlm, engine: MockQueryEngine, ready: bool) -> Router {
    router(state(llm, engine, ready))
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn titling_llm() -> MockLlm {
    MockLlm::with_handler(|messages| {
        let prompt = &messages[0].content;
        if prompt.starts_with("Gi en kort tittel") {
            MockReply::text("Tittel")
        } else {
            MockReply::text("Sammendrag")
        }
    })
}

#[tokio::test]
async fn test_health_reports_readiness() {
    let response = app(titling_llm(), MockQueryEngine::new(), false)
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["ready"], false);
    assert_eq!(body["agents"], json!([STRUCTURED_ANSWER, SUBQUERY_ORCHESTRATOR]));
}

#[tokio::test]
async fn test_chat_rejected_before_ready() {
    let engine = MockQueryEngine::new();
    let response = app(titling_llm(), engine.clone(), false)
        .oneshot(post("/chat", json!({"query": "Hei", "agent": STRUCTURED_ANSWER})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_json(response).await["error"]
        .as_str()
        .unwrap()
        .contains("still loading"));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_agent_is_404() {
    let engine = MockQueryEngine::new();
    let response = app(titling_llm(), engine.clone(), true)
        .oneshot(post("/chat", json!({"query": "Hei", "agent": "agent_x"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"error": "Agent agent_x mangler!"}));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let response = app(titling_llm(), MockQueryEngine::new(), true)
        .oneshot(post("/chat", json!({"agent": STRUCTURED_ANSWER})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_rejected_answer_uses_default_description() {
    let engine = MockQueryEngine::new().with_fallback(response_with_scores("svar", &[0.1]));
    let response = app(titling_llm(), engine, true)
        .oneshot(post("/chat", json!({"query": "Hva er været?", "agent": STRUCTURED_ANSWER})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let answer = body_json(response).await["answer"].as_str().unwrap().to_string();
    assert!(answer.starts_with("Jeg beklager! Jeg svarer på spørsmål om forsikring."));
}

#[tokio::test]
async fn test_chat_accepted_answer() {
    let engine = MockQueryEngine::new().with_fallback(response_with_scores("Kort svar.", &[0.9]));
    let response = app(titling_llm(), engine, true)
        .oneshot(post(
            "/chat",
            json!({"query": "Hva dekker forsikringen?", "agent": STRUCTURED_ANSWER, "similarity_cutoff": 0.8}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let answer = body_json(response).await["answer"].as_str().unwrap().to_string();
    assert!(answer.contains("## Tittel\nTittel\n\n"));
    assert!(answer.contains("## Svar\nKort svar.\n\n"));
    assert!(answer.contains("(Relevans: 0.90)"));
}

#[tokio::test]
async fn test_pipeline_error_is_500() {
    let engine = MockQueryEngine::new().failing("index offline");
    let response = app(titling_llm(), engine, true)
        .oneshot(post("/chat", json!({"query": "Hei", "agent": STRUCTURED_ANSWER})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"]
        .as_str()
        .unwrap()
        .contains("index offline"));
}

#[tokio::test]
async fn test_stream_emits_actions_and_final_answer() {
    let engine = MockQueryEngine::new().with_fallback(response_with_scores("svar", &[0.1]));
    let response = app(titling_llm(), engine, true)
        .oneshot(post("/chat/stream", json!({"query": "Hei", "agent": STRUCTURED_ANSWER})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    let data: Vec<Value> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();

    assert_eq!(data[0], json!({"action": "Calling llm to get the initial answer"}));
    assert_eq!(data[1], json!({"action": "Validating the response"}));
    let last = data.last().unwrap();
    assert!(last["final_answer"].as_str().unwrap().starts_with("Jeg beklager!"));
}

#[tokio::test]
async fn test_stream_reports_error_event() {
    let llm = MockLlm::scripted(vec![MockReply::Fail("model down".into())]);
    let response = app(llm, MockQueryEngine::new(), true)
        .oneshot(post("/chat/stream", json!({"query": "Hei", "agent": SUBQUERY_ORCHESTRATOR})))
        .await
        .unwrap();

    let text = body_text(response).await;
    let last = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .last()
        .unwrap()
        .to_string();
    let last: Value = serde_json::from_str(&last).unwrap();
    assert!(last["error"].as_str().unwrap().contains("model down"));
}

#[tokio::test]
async fn test_readiness_probe_flips_flag() {
    let state = state(titling_llm(), MockQueryEngine::new(), false);
    let probe = spawn_readiness_probe(state.clone(), Duration::from_millis(10), CancellationToken::new());
    tokio::time::timeout(Duration::from_secs(5), probe).await.unwrap().unwrap();
    assert!(state.is_ready());
}

#[tokio::test]
async fn test_readiness_probe_stops_on_shutdown() {
    let state = state(titling_llm(), MockQueryEngine::new().not_ready(), false);
    let shutdown = CancellationToken::new();
    let probe = spawn_readiness_probe(state.clone(), Duration::from_millis(10), shutdown.clone());
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), probe).await.unwrap().unwrap();
    assert!(!state.is_ready());
}
