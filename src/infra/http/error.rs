use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::{AppError, ErrorReport};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const INVALID_NAME: &str = "invalid_name";
    pub const VALIDATION: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const COMPILE: &str = "compile_error";
    pub const RENDER: &str = "render_error";
    pub const STORAGE: &str = "storage_unavailable";
    pub const TIMEOUT: &str = "timeout";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        let detail = format!("{code}: {}", hint.as_deref().unwrap_or(message));
        Self {
            status,
            code,
            message,
            hint,
            report: ErrorReport::from_message("infra::http::api", status, detail),
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = err.status_code();
        let code = match &err {
            AppError::InvalidName(_) => codes::INVALID_NAME,
            AppError::Validation { .. } => codes::VALIDATION,
            AppError::NotFound { .. } => codes::NOT_FOUND,
            AppError::Compile { .. } => codes::COMPILE,
            AppError::Render { .. } => codes::RENDER,
            AppError::Storage { .. } => codes::STORAGE,
            AppError::Cancelled { .. } => codes::TIMEOUT,
            AppError::Infra(_) | AppError::Unexpected(_) => codes::INTERNAL,
        };
        // Backend details stay in the logs; callers get them only for errors
        // about their own input.
        let hint = match &err {
            AppError::InvalidName(inner) => Some(inner.to_string()),
            AppError::Validation { source, .. } | AppError::Compile { source, .. } => {
                Some(source.to_string())
            }
            AppError::Render { source, .. } => Some(source.to_string()),
            _ => None,
        };
        Self {
            status,
            code,
            message: err.presentation_message(),
            hint,
            report: ErrorReport::from_error("infra::http::templates", status, &err),
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                codes::PAYLOAD_TOO_LARGE,
                "Template body too large",
                Some(rejection.body_text()),
            );
        }
        Self::new(
            rejection.status(),
            codes::BAD_REQUEST,
            "Request body could not be read",
            Some(rejection.body_text()),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        // Attach a structured report so shared logging middleware can emit rich diagnostics.
        self.report.attach(&mut response);
        response
    }
}
