//! Application error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::aggregate::AggregateError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Aggregate(AggregateError::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Aggregate(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Configuration and validation messages name the view or field and
        // are echoed; internal and filter failures are only logged.
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            AppError::Aggregate(e @ AggregateError::Configuration { .. }) => {
                tracing::error!(error = %e, "aggregate misconfigured");
                e.to_string()
            }
            AppError::Aggregate(AggregateError::Filter(e)) => {
                tracing::error!(error = %e, "aggregate filter failed");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let response =
            AppError::from(AggregateError::Validation("Invalid sorting field: year".into()))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn configuration_maps_to_server_error() {
        let response = AppError::from(AggregateError::Configuration {
            view: "PlayView".into(),
            message: "missing source".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"error": "PlayView: missing source"})
        );
    }

    #[tokio::test]
    async fn filter_failure_is_redacted() {
        let response =
            AppError::from(AggregateError::Filter(anyhow::anyhow!("db password wrong")))
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"error": "internal server error"})
        );
    }

    #[test]
    fn not_found_status() {
        assert_eq!(AppError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
    }
}
