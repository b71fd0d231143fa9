//! Domain layer types and invariants.

pub mod error;
pub mod name;
pub mod params;

pub use error::DomainError;
pub use name::ArtifactName;
pub use params::{ParamValue, Parameters};
