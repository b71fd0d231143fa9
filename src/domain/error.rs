use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("artifact name is empty")]
    EmptyName,
    #[error("artifact name exceeds {max} bytes")]
    NameTooLong { max: usize },
    #[error("artifact name `{name}` is invalid: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

impl DomainError {
    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason,
        }
    }
}
