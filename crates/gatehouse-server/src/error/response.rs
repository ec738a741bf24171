use super::types::ApiError;
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            error!(error = ?self, code = self.error_code(), "Server error occurred");
        } else if matches!(self, ApiError::Unauthorized | ApiError::InsufficientPermissions) {
            warn!(code = self.error_code(), "Request rejected");
        }

        // Internal details only leak in debug builds.
        let message = match &self {
            ApiError::Authorization(source) if cfg!(debug_assertions) => format!("{self}: {source}"),
            ApiError::Internal(source) if cfg!(debug_assertions) => format!("{self}: {source}"),
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorBody {
                code: self.error_code(),
                message,
            },
        };
        (self.status_code(), Json(body)).into_response()
    }
}
