//! `ArtifactStore` backed by the `object_store` crate.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStore, PutPayload};
use tracing::{debug, instrument};

use super::{
    ArtifactStore, CallContext, KeyBuilder, StoreBackend, StoreError, StoreResult, StoreSpec,
};
use crate::domain::ArtifactName;

/// Artifact store over any `object_store` backend:
/// - S3 and S3-compatible services
/// - Azure Blob Storage
/// - Google Cloud Storage
/// - Local filesystem
/// - In-memory (tests, local runs)
pub struct ObjectStoreArtifactStore {
    inner: Arc<dyn ObjectStore>,
    keys: KeyBuilder,
}

impl ObjectStoreArtifactStore {
    /// Build a store from a parsed spec and the configured key prefix.
    pub fn from_spec(spec: &StoreSpec, prefix: &str) -> StoreResult<Self> {
        let inner: Arc<dyn ObjectStore> = match &spec.backend {
            StoreBackend::Memory => Arc::new(object_store::memory::InMemory::new()),
            StoreBackend::File { root } => {
                std::fs::create_dir_all(root).map_err(|e| {
                    StoreError::invalid_spec(
                        root.display().to_string(),
                        format!("failed to create store directory: {e}"),
                    )
                })?;
                let local =
                    object_store::local::LocalFileSystem::new_with_prefix(root).map_err(|e| {
                        StoreError::invalid_spec(root.display().to_string(), e.to_string())
                    })?;
                Arc::new(local)
            }
            StoreBackend::S3 { bucket, region } => {
                let mut builder =
                    object_store::aws::AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                Arc::new(builder.build().map_err(|e| {
                    StoreError::invalid_spec(format!("s3://{bucket}"), e.to_string())
                })?)
            }
            StoreBackend::Azure { container } => Arc::new(
                object_store::azure::MicrosoftAzureBuilder::from_env()
                    .with_container_name(container)
                    .build()
                    .map_err(|e| {
                        StoreError::invalid_spec(format!("az://{container}"), e.to_string())
                    })?,
            ),
            StoreBackend::Gcs { bucket } => Arc::new(
                object_store::gcp::GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket)
                    .build()
                    .map_err(|e| {
                        StoreError::invalid_spec(format!("gs://{bucket}"), e.to_string())
                    })?,
            ),
        };

        Ok(Self::new(inner, &spec.key_prefix(prefix)))
    }

    /// Parse `url` and build the store.
    pub fn from_url(url: &str, prefix: &str) -> StoreResult<Self> {
        let spec = StoreSpec::parse(url)?;
        Self::from_spec(&spec, prefix)
    }

    /// Wrap an existing backend.
    pub fn new(inner: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        Self {
            inner,
            keys: KeyBuilder::new(prefix),
        }
    }

    /// In-memory store for tests.
    pub fn memory() -> Self {
        Self::memory_with_prefix("")
    }

    pub fn memory_with_prefix(prefix: &str) -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()), prefix)
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }
}

#[async_trait]
impl ArtifactStore for ObjectStoreArtifactStore {
    #[instrument(skip_all, fields(artifact = %name, size = bytes.len()))]
    async fn put(&self, name: &ArtifactName, bytes: Bytes, ctx: &CallContext) -> StoreResult<()> {
        let key = self.keys.artifact_key(name);
        ctx.run("put", async {
            self.inner
                .put(&key, PutPayload::from_bytes(bytes))
                .await
                .map(|_| ())
                .map_err(|e| StoreError::from_object_store("put", e))
        })
        .await?;
        debug!(key = %key, "artifact stored");
        Ok(())
    }

    #[instrument(skip_all, fields(artifact = %name))]
    async fn get(&self, name: &ArtifactName, ctx: &CallContext) -> StoreResult<Option<Bytes>> {
        let key = self.keys.artifact_key(name);
        ctx.run("get", async {
            let result = match self.inner.get(&key).await {
                Ok(result) => result,
                Err(object_store::Error::NotFound { .. }) => return Ok(None),
                Err(e) => return Err(StoreError::from_object_store("get", e)),
            };
            // Absence can also surface while streaming if the object vanished.
            match result.bytes().await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(object_store::Error::NotFound { .. }) => Ok(None),
                Err(e) => Err(StoreError::from_object_store("get", e)),
            }
        })
        .await
    }

    #[instrument(skip_all, fields(artifact = %name))]
    async fn delete(&self, name: &ArtifactName, ctx: &CallContext) -> StoreResult<()> {
        let key = self.keys.artifact_key(name);
        ctx.run("delete", async {
            match self.inner.delete(&key).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(StoreError::from_object_store("delete", e)),
            }
        })
        .await
    }
}
