use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use svarflyt_core::error::SvarflytError;

const NOT_READY: &str = "Indexes are still loading, please try again later.";

/// Error returned by the chat handlers, rendered as `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    NotReady,
    BadRequest(String),
    Pipeline(SvarflytError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotReady | Self::Pipeline(SvarflytError::NotReady(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Pipeline(SvarflytError::UnknownAgent(_)) => StatusCode::NOT_FOUND,
            Self::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::NotReady => NOT_READY.to_string(),
            Self::BadRequest(message) => message.clone(),
            Self::Pipeline(e) => e.to_string(),
        }
    }
}

impl From<SvarflytError> for ApiError {
    fn from(e: SvarflytError) -> Self {
        Self::Pipeline(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message() }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::NotReady.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SvarflytError::UnknownAgent("a".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(SvarflytError::LlmRequest("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unknown_agent_message() {
        let e = ApiError::from(SvarflytError::UnknownAgent("agent_x".into()));
        assert_eq!(e.message(), "Agent agent_x mangler!");
    }
}
