use thiserror::Error;

use crate::store::StoreError;

/// Why a cache lookup could not produce an artifact.
#[derive(Debug, Error)]
pub enum ResolveError<E> {
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("stored artifact failed to compile: {0}")]
    Compile(#[source] E),
}

impl<E> ResolveError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_cancelled())
    }
}
