//! Client for the retrieval-augmented query backend.
//!
//! The backend owns the vector indexes. It answers `POST /query` with the
//! generated response and the scored source nodes behind it, and reports
//! index readiness on `GET /health`.

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use svarflyt_core::config::RetrievalConfig;
use svarflyt_core::error::{Result, SvarflytError};
use svarflyt_core::traits::QueryEngine;
use svarflyt_core::types::QueryResponse;

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

pub struct HttpQueryEngine {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpQueryEngine {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

impl QueryEngine for HttpQueryEngine {
    fn query<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<QueryResponse>> {
        Box::pin(async move {
            let req = self
                .http
                .post(self.endpoint("query"))
                .json(&QueryRequest { query: text });

            let response = self
                .authorize(req)
                .send()
                .await
                .map_err(|e| SvarflytError::QueryBackend(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SvarflytError::QueryBackend(format!("HTTP {}: {}", status, body)));
            }

            let parsed: QueryResponse = response
                .json()
                .await
                .map_err(|e| SvarflytError::QueryBackend(format!("invalid response: {}", e)))?;

            debug!(nodes = parsed.source_nodes.len(), "Query backend answered");
            Ok(parsed)
        })
    }

    fn health(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let response = self
                .authorize(self.http.get(self.endpoint("health")))
                .send()
                .await
                .map_err(|e| SvarflytError::NotReady(e.to_string()))?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(SvarflytError::NotReady(format!("HTTP {}", response.status())))
            }
        })
    }
}
