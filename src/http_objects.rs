use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use utoipa::ToSchema;

/// Error surface of the ingest API. Client errors render as plain text;
/// server errors render as a JSON `{"error": ...}` body carrying an opaque
/// message, with the underlying failure detail going to the log only.
#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct IngestAPIError {
    #[serde(skip)]
    status_code: StatusCode,
    message: String,
}

impl IngestAPIError {
    pub fn new(status_code: StatusCode, message: &str) -> Self {
        Self {
            status_code,
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal_error(e: anyhow::Error) -> Self {
        error!("internal error: {:?}", e);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl IntoResponse for IngestAPIError {
    fn into_response(self) -> Response {
        error!("API Error: {} - {}", self.status_code, self.message);
        if self.status_code.is_server_error() {
            return (self.status_code, Json(json!({ "error": self.message }))).into_response();
        }
        (self.status_code, self.message).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub id: String,
}
