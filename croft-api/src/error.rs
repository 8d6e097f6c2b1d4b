use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use croft_core::Error;
use serde_json::json;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self.0 {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::InsufficientStock { .. } => (StatusCode::CONFLICT, self.0.to_string()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::State(msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::Payment(msg) => (StatusCode::PAYMENT_REQUIRED, msg.clone()),
            Error::Signature(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            Error::Persistence(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
