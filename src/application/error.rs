use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{
    domain::{ArtifactName, DomainError},
    infra::error::InfraError,
    store::StoreError,
    template::{RenderError, SyntaxError},
};

/// Diagnostic chain attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    InvalidName(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("template `{name}` not found")]
    NotFound { name: String },
    #[error("template `{name}` rejected: {source}")]
    Validation {
        name: String,
        #[source]
        source: SyntaxError,
    },
    #[error("stored template `{name}` failed to compile: {source}")]
    Compile {
        name: String,
        #[source]
        source: SyntaxError,
    },
    #[error("template `{name}` failed to render: {source}")]
    Render {
        name: String,
        #[source]
        source: RenderError,
    },
    #[error("storage failure for template `{name}`")]
    Storage {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("request for template `{name}` did not complete")]
    Cancelled {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(name: &ArtifactName) -> Self {
        Self::NotFound {
            name: name.to_string(),
        }
    }

    /// Classify a store failure; deadlines and cancellations stay distinct
    /// from backend faults.
    pub fn storage(name: &ArtifactName, source: StoreError) -> Self {
        let name = name.to_string();
        if source.is_cancelled() {
            Self::Cancelled { name, source }
        } else {
            Self::Storage { name, source }
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidName(_) | AppError::Validation { .. } | AppError::Render { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Compile { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Storage { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Cancelled { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Infra(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::InvalidName(_) => "Invalid template name",
            AppError::Validation { .. } => "Template failed validation",
            AppError::Render { .. } => "Template could not be applied to the given parameters",
            AppError::NotFound { .. } => "Template not found",
            AppError::Compile { .. } => "Stored template could not be compiled",
            AppError::Storage { .. } => "Template storage temporarily unavailable",
            AppError::Cancelled { .. } => "Template storage did not respond in time",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Storage { .. }) => "Template storage could not be opened",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CancelReason;

    fn name() -> ArtifactName {
        ArtifactName::parse("greet").unwrap()
    }

    #[test]
    fn cancelled_store_errors_are_classified_separately() {
        let cancelled = StoreError::Cancelled {
            operation: "get",
            reason: CancelReason::DeadlineExceeded,
        };
        let err = AppError::storage(&name(), cancelled);
        assert!(matches!(err, AppError::Cancelled { .. }));
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let denied = StoreError::AccessDenied {
            operation: "put",
            message: "no".to_string(),
        };
        let err = AppError::storage(&name(), denied);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn report_collects_source_chain() {
        let err = AppError::Validation {
            name: "greet".to_string(),
            source: SyntaxError::new("greet", 1, "unclosed action"),
        };
        let report = ErrorReport::from_error("test", err.status_code(), &err);
        assert_eq!(report.status, StatusCode::BAD_REQUEST);
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1], "template: greet:1: unclosed action");
    }
}
