//! Durable artifact storage.
//!
//! A thin adapter between artifact names and an object-storage bucket: one
//! object per name under a fixed key prefix, nothing else. The backend is
//! picked once at startup from a store URL.
//!
//! ```text
//! memory://                        in-process, for tests and local runs
//! file:///var/lib/tplstore         local filesystem
//! s3://bucket/base?region=eu-west-1
//! az://container/base
//! gs://bucket/base
//! ```
//!
//! Credentials and endpoints come from each backend's usual environment
//! variables.

pub mod context;
pub mod error;
pub mod naming;
pub mod object_store_backend;

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::ArtifactName;

pub use context::{CallContext, CancelSignal};
pub use error::{CancelReason, StoreError, StoreResult};
pub use naming::KeyBuilder;
pub use object_store_backend::ObjectStoreArtifactStore;

/// Which object-storage service backs the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    File { root: PathBuf },
    S3 { bucket: String, region: Option<String> },
    Azure { container: String },
    Gcs { bucket: String },
}

/// Parsed store specification from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSpec {
    pub backend: StoreBackend,
    /// Key prefix carried in the URL path for bucket-based backends.
    pub url_prefix: String,
}

impl StoreSpec {
    /// Parse a store URL like `s3://bucket/prefix` or `file:///path`.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let url = url::Url::parse(raw).map_err(|e| StoreError::invalid_spec(raw, e.to_string()))?;

        let bucket = || {
            url.host_str()
                .filter(|host| !host.is_empty())
                .map(str::to_string)
                .ok_or_else(|| StoreError::invalid_spec(raw, "URL must include a bucket name"))
        };
        let url_prefix = url.path().trim_matches('/').to_string();

        let (backend, url_prefix) = match url.scheme() {
            "memory" => (StoreBackend::Memory, String::new()),
            "file" => {
                let root = url
                    .to_file_path()
                    .map_err(|_| StoreError::invalid_spec(raw, "file URL must be absolute"))?;
                (StoreBackend::File { root }, String::new())
            }
            "s3" => {
                let region = url
                    .query_pairs()
                    .find(|(k, _)| k == "region")
                    .map(|(_, v)| v.to_string());
                (
                    StoreBackend::S3 {
                        bucket: bucket()?,
                        region,
                    },
                    url_prefix,
                )
            }
            "az" | "azure" => (
                StoreBackend::Azure {
                    container: bucket()?,
                },
                url_prefix,
            ),
            "gs" | "gcs" => (StoreBackend::Gcs { bucket: bucket()? }, url_prefix),
            scheme => {
                return Err(StoreError::invalid_spec(
                    raw,
                    format!("unsupported scheme: {scheme}"),
                ));
            }
        };

        Ok(Self {
            backend,
            url_prefix,
        })
    }

    /// Join the URL path prefix with the configured key prefix.
    pub fn key_prefix(&self, configured: &str) -> String {
        let configured = configured.trim_matches('/');
        match (self.url_prefix.is_empty(), configured.is_empty()) {
            (true, _) => configured.to_string(),
            (false, true) => self.url_prefix.clone(),
            (false, false) => format!("{}/{}", self.url_prefix, configured),
        }
    }
}

/// Durable name → bytes persistence.
///
/// Every call honours the deadline and cancellation carried by `ctx`. Nothing
/// is retried here; callers own retry policy.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Create or overwrite the object for `name`. Returns once the backend
    /// has acknowledged the write.
    async fn put(&self, name: &ArtifactName, bytes: Bytes, ctx: &CallContext) -> StoreResult<()>;

    /// Fetch the stored bytes, or `None` if nothing is stored under `name`.
    async fn get(&self, name: &ArtifactName, ctx: &CallContext) -> StoreResult<Option<Bytes>>;

    /// Remove the object for `name`. Removing an absent object succeeds.
    async fn delete(&self, name: &ArtifactName, ctx: &CallContext) -> StoreResult<()>;
}
