use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Failures local to one chat exchange. None of them end the session.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("model list unavailable: {0}")]
    ModelListUnavailable(String),
    #[error("an exchange is already in progress")]
    ExchangeInProgress,
}

impl ChatError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { name, reason: reason.into() }
    }

    fn status(&self) -> StatusCode {
        match self {
            ChatError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            ChatError::NetworkFailure(_) | ChatError::MalformedFrame(_) => StatusCode::BAD_GATEWAY,
            ChatError::ModelListUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::ExchangeInProgress => StatusCode::CONFLICT,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::NetworkFailure(e.to_string())
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ChatError::invalid("temperature", "out of range").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ChatError::NetworkFailure("down".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ChatError::ExchangeInProgress.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_parameter_names_the_field() {
        let e = ChatError::invalid("top_p", "must lie in [0, 1], got 1.5");
        assert_eq!(e.to_string(), "invalid parameter `top_p`: must lie in [0, 1], got 1.5");
    }
}
