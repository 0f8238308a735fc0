use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// Uniform envelope for every JSON response, success or failure, matching
/// the `{accepted, reason?, composite?}`-style shapes in §6.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()) }
    }
}

/// Failure path for handlers returning `Result<_, AppError>`. Engine errors
/// carry their §7 taxonomy code through to the response body; anything else
/// collapses to a 500 with the anyhow message.
pub struct AppError {
    status: StatusCode,
    message: String,
    code: Option<&'static str>,
}

impl AppError {
    pub fn with_status(status: StatusCode, err: anyhow::Error) -> Self {
        Self { status, message: err.to_string(), code: None }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into(), code: None }
    }
}

impl From<bias_core::EngineError> for AppError {
    fn from(e: bias_core::EngineError) -> Self {
        let status = match &e {
            bias_core::EngineError::OwnershipViolation { .. } => StatusCode::FORBIDDEN,
            bias_core::EngineError::OutOfRange(_) | bias_core::EngineError::SanityBoundsViolation { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            bias_core::EngineError::UnknownFactor(_) => StatusCode::BAD_REQUEST,
            bias_core::EngineError::ConfigInvalid(_) => StatusCode::INTERNAL_SERVER_ERROR,
            bias_core::EngineError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            bias_core::EngineError::ProviderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            bias_core::EngineError::DuplicateSignalId(_) => StatusCode::CONFLICT,
            bias_core::EngineError::CircuitBreakerFallbackLost => StatusCode::INTERNAL_SERVER_ERROR,
            bias_core::EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: e.to_string(), code: Some(e.code()) }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(status = %self.status, code = ?self.code, message = %self.message, "request failed");
        (
            self.status,
            Json(json!({
                "success": false,
                "error": self.message,
                "code": self.code,
            })),
        )
            .into_response()
    }
}
