//! Template artifact operations.
//!
//! Every mutation is durable before the cache is touched, and the cache is
//! invalidated before the caller sees success.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, instrument};

use crate::{
    application::error::AppError,
    cache::{CompileCache, Compiler, ResolveError},
    domain::{ArtifactName, Parameters},
    store::{ArtifactStore, CallContext},
    template::{Template, TemplateEngine},
};

pub type TemplateCache<S> = CompileCache<S, TemplateEngine>;

pub struct ArtifactService<S> {
    cache: Arc<TemplateCache<S>>,
}

impl<S> Clone for ArtifactService<S> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S: ArtifactStore> ArtifactService<S> {
    pub fn new(cache: Arc<TemplateCache<S>>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<TemplateCache<S>> {
        &self.cache
    }

    /// Validate `source`, persist it and drop any stale compiled copy.
    /// Invalid sources leave both the store and the cache untouched.
    #[instrument(skip(self, source, ctx), fields(artifact = %name, size = source.len()))]
    pub async fn write(
        &self,
        name: &ArtifactName,
        source: Bytes,
        ctx: &CallContext,
    ) -> Result<(), AppError> {
        self.cache
            .compiler()
            .compile(name.as_str(), &source)
            .map_err(|source| AppError::Validation {
                name: name.to_string(),
                source,
            })?;

        self.cache
            .store()
            .put(name, source, ctx)
            .await
            .map_err(|err| AppError::storage(name, err))?;
        self.cache.invalidate(name);

        info!(target = "tplstore::service", artifact = %name, "template written");
        Ok(())
    }

    /// Return the stored source of `name`.
    #[instrument(skip(self, ctx), fields(artifact = %name))]
    pub async fn read(&self, name: &ArtifactName, ctx: &CallContext) -> Result<Bytes, AppError> {
        let template = self.resolve(name, ctx).await?;
        Ok(Bytes::copy_from_slice(template.source().as_bytes()))
    }

    /// Remove `name`. Removing an absent template succeeds.
    #[instrument(skip(self, ctx), fields(artifact = %name))]
    pub async fn delete(&self, name: &ArtifactName, ctx: &CallContext) -> Result<(), AppError> {
        self.cache
            .store()
            .delete(name, ctx)
            .await
            .map_err(|err| AppError::storage(name, err))?;
        self.cache.invalidate(name);

        info!(target = "tplstore::service", artifact = %name, "template deleted");
        Ok(())
    }

    /// Execute `name` against `params`.
    #[instrument(skip(self, params, ctx), fields(artifact = %name, params = params.len()))]
    pub async fn apply(
        &self,
        name: &ArtifactName,
        params: &Parameters,
        ctx: &CallContext,
    ) -> Result<String, AppError> {
        let template = self.resolve(name, ctx).await?;
        template.execute(params).map_err(|source| AppError::Render {
            name: name.to_string(),
            source,
        })
    }

    async fn resolve(
        &self,
        name: &ArtifactName,
        ctx: &CallContext,
    ) -> Result<Arc<Template>, AppError> {
        match self.cache.resolve(name, ctx).await {
            Ok(Some(template)) => Ok(template),
            Ok(None) => Err(AppError::not_found(name)),
            Err(ResolveError::Storage(err)) => Err(AppError::storage(name, err)),
            Err(ResolveError::Compile(source)) => Err(AppError::Compile {
                name: name.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::store::{ArtifactStore, ObjectStoreArtifactStore};

    fn service() -> ArtifactService<ObjectStoreArtifactStore> {
        let store = Arc::new(ObjectStoreArtifactStore::memory());
        let cache = Arc::new(CompileCache::new(
            store,
            TemplateEngine,
            CacheConfig::default(),
        ));
        ArtifactService::new(cache)
    }

    fn name(raw: &str) -> ArtifactName {
        ArtifactName::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn write_then_apply() {
        let svc = service();
        let ctx = CallContext::background();
        let greet = name("greet");

        svc.write(&greet, Bytes::from("Hello {{.Name}}"), &ctx)
            .await
            .unwrap();
        let out = svc
            .apply(&greet, &Parameters::new().with("Name", "World"), &ctx)
            .await
            .unwrap();
        assert_eq!(out, "Hello World");
        assert_eq!(
            svc.read(&greet, &ctx).await.unwrap(),
            Bytes::from("Hello {{.Name}}")
        );
    }

    #[tokio::test]
    async fn invalid_write_is_rejected_without_storing() {
        let svc = service();
        let ctx = CallContext::background();
        let bad = name("bad");

        let err = svc
            .write(&bad, Bytes::from("Hello {{"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert!(matches!(
            svc.read(&bad, &ctx).await.unwrap_err(),
            AppError::NotFound { .. }
        ));
        assert!(
            svc.cache()
                .store()
                .get(&bad, &ctx)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn invalid_overwrite_keeps_previous_version() {
        let svc = service();
        let ctx = CallContext::background();
        let x = name("x");

        svc.write(&x, Bytes::from("A"), &ctx).await.unwrap();
        svc.read(&x, &ctx).await.unwrap();
        assert!(svc.write(&x, Bytes::from("{{ if }}"), &ctx).await.is_err());
        assert_eq!(svc.read(&x, &ctx).await.unwrap(), Bytes::from("A"));
    }

    #[tokio::test]
    async fn overwrite_is_visible_immediately() {
        let svc = service();
        let ctx = CallContext::background();
        let x = name("x");

        svc.write(&x, Bytes::from("A"), &ctx).await.unwrap();
        assert_eq!(svc.read(&x, &ctx).await.unwrap(), Bytes::from("A"));
        svc.write(&x, Bytes::from("B"), &ctx).await.unwrap();
        assert_eq!(svc.read(&x, &ctx).await.unwrap(), Bytes::from("B"));
    }

    #[tokio::test]
    async fn delete_hides_cached_template() {
        let svc = service();
        let ctx = CallContext::background();
        let x = name("x");

        svc.write(&x, Bytes::from("cached"), &ctx).await.unwrap();
        svc.read(&x, &ctx).await.unwrap();
        svc.delete(&x, &ctx).await.unwrap();
        assert!(matches!(
            svc.read(&x, &ctx).await.unwrap_err(),
            AppError::NotFound { .. }
        ));
        svc.delete(&x, &ctx).await.expect("second delete succeeds");
    }

    #[tokio::test]
    async fn missing_parameter_is_a_render_error() {
        let svc = service();
        let ctx = CallContext::background();
        let greet = name("greet");

        svc.write(&greet, Bytes::from("Hello {{.Name}}"), &ctx)
            .await
            .unwrap();
        let err = svc
            .apply(&greet, &Parameters::new(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Render { .. }));
    }

    #[tokio::test]
    async fn corrupt_stored_bytes_surface_as_compile_error() {
        let svc = service();
        let ctx = CallContext::background();
        let raw = name("raw");

        svc.cache()
            .store()
            .put(&raw, Bytes::from("{{ end }}"), &ctx)
            .await
            .unwrap();
        let err = svc.read(&raw, &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Compile { .. }));
    }
}
