use thiserror::Error;

/// Source that failed to compile.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("template: {name}:{line}: {message}")]
pub struct SyntaxError {
    pub name: String,
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(name: &str, line: usize, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            line,
            message: message.into(),
        }
    }
}

/// Failure while executing a compiled template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("template: {name}:{line}: map has no entry for key \"{key}\"")]
    MissingKey {
        name: String,
        line: usize,
        key: String,
    },
    #[error("template: {name}:{line}: {message}")]
    Eval {
        name: String,
        line: usize,
        message: String,
    },
}

impl RenderError {
    pub fn eval(name: &str, line: usize, message: impl Into<String>) -> Self {
        Self::Eval {
            name: name.to_string(),
            line,
            message: message.into(),
        }
    }

    pub fn is_missing_key(&self) -> bool {
        matches!(self, Self::MissingKey { .. })
    }
}
