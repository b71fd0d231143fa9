//! Application services layer.

pub mod error;
pub mod service;

pub use service::{ArtifactService, TemplateCache};
