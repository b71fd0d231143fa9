use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::compile::{CompileCache, Compiler};
use crate::store::ArtifactStore;

/// Periodically purge expired entries from `cache`.
///
/// Expired entries are already invisible to readers; this only reclaims
/// their memory. Abort the returned handle to stop the sweeper.
pub fn spawn_sweeper<S, C>(cache: Arc<CompileCache<S, C>>, every: Duration) -> JoinHandle<()>
where
    S: ArtifactStore + 'static,
    C: Compiler,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            let evicted = cache.purge_expired();
            debug!(evicted, remaining = cache.len(), "compile cache sweep");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, ManualClock};
    use crate::domain::ArtifactName;
    use crate::store::{ArtifactStore, CallContext, ObjectStoreArtifactStore};
    use crate::template::TemplateEngine;

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_expired_entries() {
        let store = Arc::new(ObjectStoreArtifactStore::memory());
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(CompileCache::with_clock(
            Arc::clone(&store),
            TemplateEngine,
            CacheConfig::default().with_ttl(Duration::from_secs(5)),
            clock.clone(),
        ));
        let name = ArtifactName::parse("swept").unwrap();
        let ctx = CallContext::background();
        store.put(&name, "x".into(), &ctx).await.unwrap();
        cache.resolve(&name, &ctx).await.unwrap();
        assert_eq!(cache.len(), 1);

        let handle = spawn_sweeper(Arc::clone(&cache), Duration::from_secs(60));
        clock.advance(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(cache.is_empty());
        handle.abort();
    }
}
