//! Name → compiled artifact cache in front of an [`ArtifactStore`].
//!
//! Each name owns a slot holding an async fill lock, the current entry and a
//! generation counter. Reads of a live entry take only shared locks and never
//! await. Misses serialize per name on the fill lock, so concurrent first
//! reads of one name compile once while other names fill in parallel.
//!
//! `invalidate` bumps the slot generation under the state lock. A fill that
//! started before the bump sees a different generation when it tries to
//! insert and leaves the slot empty, so bytes fetched before an acknowledged
//! write never become a cache entry.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use dashmap::DashMap;
use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::clock::{Clock, SystemClock};
use super::config::CacheConfig;
use super::error::ResolveError;
use super::lock::{rw_read, rw_write};
use crate::domain::ArtifactName;
use crate::store::{ArtifactStore, CallContext};

const SOURCE: &str = "cache::compile";

const METRIC_CACHE_HIT: &str = "tplstore_cache_hit_total";
const METRIC_CACHE_MISS: &str = "tplstore_cache_miss_total";
const METRIC_CACHE_COMPILE: &str = "tplstore_cache_compile_total";
const METRIC_CACHE_INVALIDATE: &str = "tplstore_cache_invalidate_total";
const METRIC_CACHE_EVICT: &str = "tplstore_cache_evict_total";
const METRIC_CACHE_FILL_MS: &str = "tplstore_cache_fill_ms";

/// Turns stored bytes into a ready-to-use artifact.
pub trait Compiler: Send + Sync + 'static {
    type Artifact: Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    fn compile(&self, name: &str, source: &[u8]) -> Result<Self::Artifact, Self::Error>;
}

struct CacheEntry<A> {
    artifact: Arc<A>,
    expires_at: Instant,
}

struct SlotState<A> {
    entry: Option<CacheEntry<A>>,
    generation: u64,
}

struct NameSlot<A> {
    fill: Mutex<()>,
    state: RwLock<SlotState<A>>,
}

impl<A> NameSlot<A> {
    fn new() -> Self {
        Self {
            fill: Mutex::new(()),
            state: RwLock::new(SlotState {
                entry: None,
                generation: 0,
            }),
        }
    }

    fn live(&self, now: Instant) -> Option<Arc<A>> {
        let state = rw_read(&self.state, SOURCE, "live");
        state
            .entry
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .map(|entry| Arc::clone(&entry.artifact))
    }

    fn is_live(&self, now: Instant) -> bool {
        let state = rw_read(&self.state, SOURCE, "is_live");
        state.entry.as_ref().is_some_and(|entry| entry.expires_at > now)
    }

    fn has_entry(&self) -> bool {
        rw_read(&self.state, SOURCE, "has_entry").entry.is_some()
    }

    fn generation(&self) -> u64 {
        rw_read(&self.state, SOURCE, "generation").generation
    }

    /// Install `artifact` unless the slot was invalidated since `generation`.
    fn install(&self, generation: u64, artifact: Arc<A>, expires_at: Instant) -> bool {
        let mut state = rw_write(&self.state, SOURCE, "install");
        if state.generation != generation {
            return false;
        }
        state.entry = Some(CacheEntry {
            artifact,
            expires_at,
        });
        true
    }

    fn clear(&self) -> bool {
        let mut state = rw_write(&self.state, SOURCE, "clear");
        state.generation = state.generation.wrapping_add(1);
        state.entry.take().is_some()
    }
}

/// Coherent compile cache over an artifact store.
pub struct CompileCache<S, C: Compiler> {
    store: Arc<S>,
    compiler: C,
    slots: DashMap<String, Arc<NameSlot<C::Artifact>>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl<S, C: Compiler> fmt::Debug for CompileCache<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileCache")
            .field("slots", &self.slots.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<S, C> CompileCache<S, C>
where
    S: ArtifactStore,
    C: Compiler,
{
    pub fn new(store: Arc<S>, compiler: C, config: CacheConfig) -> Self {
        Self::with_clock(store, compiler, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<S>,
        compiler: C,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            compiler,
            slots: DashMap::new(),
            config,
            clock,
        }
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the compiled artifact for `name`, filling from the store on a
    /// miss. `Ok(None)` means nothing is stored under `name`.
    #[instrument(skip_all, fields(artifact = %name))]
    pub async fn resolve(
        &self,
        name: &ArtifactName,
        ctx: &CallContext,
    ) -> Result<Option<Arc<C::Artifact>>, ResolveError<C::Error>> {
        if let Some(artifact) = self.lookup(name.as_str()) {
            counter!(METRIC_CACHE_HIT).increment(1);
            return Ok(Some(artifact));
        }

        let slot = self.slot(name.as_str());
        let result = {
            let _fill = slot.fill.lock().await;
            self.fill(name, &slot, ctx).await
        };
        drop(slot);
        self.release(name.as_str());
        result
    }

    async fn fill(
        &self,
        name: &ArtifactName,
        slot: &NameSlot<C::Artifact>,
        ctx: &CallContext,
    ) -> Result<Option<Arc<C::Artifact>>, ResolveError<C::Error>> {
        // Another caller may have filled the slot while we waited.
        if let Some(artifact) = slot.live(self.clock.now()) {
            counter!(METRIC_CACHE_HIT).increment(1);
            return Ok(Some(artifact));
        }
        counter!(METRIC_CACHE_MISS).increment(1);

        let generation = slot.generation();
        let started_at = Instant::now();

        let Some(bytes) = self.store.get(name, ctx).await? else {
            debug!("artifact not stored");
            return Ok(None);
        };

        counter!(METRIC_CACHE_COMPILE).increment(1);
        let artifact = Arc::new(
            self.compiler
                .compile(name.as_str(), &bytes)
                .map_err(ResolveError::Compile)?,
        );

        let expires_at = self.clock.now() + self.config.ttl;
        let installed = slot.install(generation, Arc::clone(&artifact), expires_at);
        histogram!(METRIC_CACHE_FILL_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(installed, size = bytes.len(), "compiled artifact");

        Ok(Some(artifact))
    }

    /// Drop any cached entry for `name`. Fills already in flight for the
    /// name will not install what they fetched.
    pub fn invalidate(&self, name: &ArtifactName) {
        counter!(METRIC_CACHE_INVALIDATE).increment(1);
        let Some(slot) = self
            .slots
            .get(name.as_str())
            .map(|slot| Arc::clone(slot.value()))
        else {
            return;
        };
        let removed = slot.clear();
        drop(slot);
        self.release(name.as_str());
        debug!(artifact = %name, removed, "invalidated cache entry");
    }

    /// Physically remove expired entries nobody is filling. Returns how many
    /// entries were evicted.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;
        self.slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 || slot.is_live(now) {
                return true;
            }
            if slot.has_entry() {
                evicted += 1;
            }
            false
        });
        if evicted > 0 {
            counter!(METRIC_CACHE_EVICT).increment(evicted as u64);
            debug!(evicted, "purged expired cache entries");
        }
        evicted
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.slots.iter().filter(|slot| slot.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<Arc<C::Artifact>> {
        let slot = self.slots.get(key)?;
        slot.live(self.clock.now())
    }

    fn slot(&self, key: &str) -> Arc<NameSlot<C::Artifact>> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(
            self.slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(NameSlot::new()))
                .value(),
        )
    }

    /// Remove the slot for `key` if it holds no live entry and no caller
    /// still references it.
    fn release(&self, key: &str) {
        let now = self.clock.now();
        self.slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1 && !slot.is_live(now));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::Notify;

    use super::*;
    use crate::cache::ManualClock;
    use crate::store::{CancelSignal, StoreError, StoreResult};

    #[derive(Debug, thiserror::Error)]
    #[error("bad source: {0}")]
    struct BadSource(String);

    /// Uppercases its input and counts invocations.
    #[derive(Default)]
    struct CountingCompiler {
        calls: AtomicUsize,
    }

    impl Compiler for Arc<CountingCompiler> {
        type Artifact = String;
        type Error = BadSource;

        fn compile(&self, _name: &str, source: &[u8]) -> Result<String, BadSource> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = String::from_utf8_lossy(source);
            if text.starts_with("bad") {
                return Err(BadSource(text.into_owned()));
            }
            Ok(text.to_uppercase())
        }
    }

    /// In-memory store whose `get` can be held open and made to fail.
    #[derive(Default)]
    struct TestStore {
        objects: std::sync::Mutex<HashMap<String, Bytes>>,
        gets: AtomicUsize,
        gate: std::sync::Mutex<Option<Arc<Notify>>>,
        held: std::sync::Mutex<HashMap<String, Arc<Notify>>>,
        entered: Notify,
        fail_next_get: std::sync::atomic::AtomicBool,
    }

    impl TestStore {
        fn set(&self, name: &str, body: &str) {
            self.objects
                .lock()
                .unwrap()
                .insert(name.to_string(), Bytes::from(body.to_string()));
        }

        fn hold_gets(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
            gate
        }

        /// Hold only the gets for `name`.
        fn hold(&self, name: &str) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.held
                .lock()
                .unwrap()
                .insert(name.to_string(), Arc::clone(&gate));
            gate
        }
    }

    #[async_trait]
    impl ArtifactStore for TestStore {
        async fn put(&self, name: &ArtifactName, bytes: Bytes, _ctx: &CallContext) -> StoreResult<()> {
            self.objects
                .lock()
                .unwrap()
                .insert(name.as_str().to_string(), bytes);
            Ok(())
        }

        async fn get(&self, name: &ArtifactName, ctx: &CallContext) -> StoreResult<Option<Bytes>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let snapshot = self.objects.lock().unwrap().get(name.as_str()).cloned();
            let gate = self
                .held
                .lock()
                .unwrap()
                .get(name.as_str())
                .cloned()
                .or_else(|| self.gate.lock().unwrap().clone());
            self.entered.notify_one();
            if let Some(gate) = gate {
                ctx.run("get", async {
                    gate.notified().await;
                    Ok(())
                })
                .await?;
            }
            if self.fail_next_get.swap(false, Ordering::SeqCst) {
                return Err(StoreError::AccessDenied {
                    operation: "get",
                    message: "injected failure".to_string(),
                });
            }
            Ok(snapshot)
        }

        async fn delete(&self, name: &ArtifactName, _ctx: &CallContext) -> StoreResult<()> {
            self.objects.lock().unwrap().remove(name.as_str());
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<TestStore>,
        compiler: Arc<CountingCompiler>,
        clock: Arc<ManualClock>,
        cache: Arc<CompileCache<TestStore, Arc<CountingCompiler>>>,
    }

    fn fixture(ttl: Duration) -> Fixture {
        let store = Arc::new(TestStore::default());
        let compiler = Arc::new(CountingCompiler::default());
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(CompileCache::with_clock(
            Arc::clone(&store),
            Arc::clone(&compiler),
            CacheConfig::default().with_ttl(ttl),
            clock.clone(),
        ));
        Fixture {
            store,
            compiler,
            clock,
            cache,
        }
    }

    fn name(raw: &str) -> ArtifactName {
        ArtifactName::parse(raw).unwrap()
    }

    fn compiles(f: &Fixture) -> usize {
        f.compiler.calls.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn hit_skips_store_and_compiler() {
        let f = fixture(Duration::from_secs(60));
        f.store.set("greet", "hello");
        let ctx = CallContext::background();

        let first = f.cache.resolve(&name("greet"), &ctx).await.unwrap();
        let second = f.cache.resolve(&name("greet"), &ctx).await.unwrap();

        assert_eq!(first.as_deref().map(String::as_str), Some("HELLO"));
        assert!(Arc::ptr_eq(first.as_ref().unwrap(), second.as_ref().unwrap()));
        assert_eq!(f.store.gets.load(Ordering::SeqCst), 1);
        assert_eq!(compiles(&f), 1);
        assert_eq!(f.cache.len(), 1);
    }

    #[tokio::test]
    async fn absent_artifact_is_not_cached() {
        let f = fixture(Duration::from_secs(60));
        let ctx = CallContext::background();

        assert!(f.cache.resolve(&name("nope"), &ctx).await.unwrap().is_none());
        assert!(f.cache.is_empty());
        assert_eq!(f.cache.slots.len(), 0);

        f.store.set("nope", "now here");
        let found = f.cache.resolve(&name("nope"), &ctx).await.unwrap();
        assert_eq!(found.as_deref().map(String::as_str), Some("NOW HERE"));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let f = fixture(Duration::from_secs(300));
        f.store.set("t", "v1");
        let ctx = CallContext::background();

        f.cache.resolve(&name("t"), &ctx).await.unwrap();
        f.clock.advance(Duration::from_secs(299));
        f.cache.resolve(&name("t"), &ctx).await.unwrap();
        assert_eq!(compiles(&f), 1);

        f.clock.advance(Duration::from_secs(2));
        assert!(f.cache.is_empty());
        f.cache.resolve(&name("t"), &ctx).await.unwrap();
        assert_eq!(compiles(&f), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let f = fixture(Duration::from_secs(60));
        f.store.set("t", "old");
        let ctx = CallContext::background();

        f.cache.resolve(&name("t"), &ctx).await.unwrap();
        f.store.set("t", "new");
        f.cache.invalidate(&name("t"));
        assert!(f.cache.is_empty());

        let fresh = f.cache.resolve(&name("t"), &ctx).await.unwrap();
        assert_eq!(fresh.as_deref().map(String::as_str), Some("NEW"));
    }

    #[tokio::test]
    async fn invalidating_unknown_name_is_a_noop() {
        let f = fixture(Duration::from_secs(60));
        f.cache.invalidate(&name("ghost"));
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn compile_errors_are_not_cached() {
        let f = fixture(Duration::from_secs(60));
        f.store.set("broken", "bad {{");
        let ctx = CallContext::background();

        for _ in 0..2 {
            let err = f.cache.resolve(&name("broken"), &ctx).await.unwrap_err();
            assert!(matches!(err, ResolveError::Compile(_)));
        }
        assert_eq!(compiles(&f), 2);
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn store_errors_are_not_cached() {
        let f = fixture(Duration::from_secs(60));
        f.store.set("t", "ok");
        f.store.fail_next_get.store(true, Ordering::SeqCst);
        let ctx = CallContext::background();

        let err = f.cache.resolve(&name("t"), &ctx).await.unwrap_err();
        assert!(matches!(err, ResolveError::Storage(_)));
        assert!(f.cache.is_empty());

        assert!(f.cache.resolve(&name("t"), &ctx).await.unwrap().is_some());
        assert_eq!(f.store.gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_compile_once() {
        let f = fixture(Duration::from_secs(60));
        f.store.set("hot", "payload");
        let gate = f.store.hold_gets();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&f.cache);
            tasks.push(tokio::spawn(async move {
                cache
                    .resolve(&name("hot"), &CallContext::background())
                    .await
                    .unwrap()
            }));
        }

        f.store.entered.notified().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_one();

        for task in tasks {
            let artifact = task.await.unwrap();
            assert_eq!(artifact.as_deref().map(String::as_str), Some("PAYLOAD"));
        }
        assert_eq!(f.store.gets.load(Ordering::SeqCst), 1);
        assert_eq!(compiles(&f), 1);
    }

    #[tokio::test]
    async fn miss_on_one_name_does_not_block_another() {
        let f = fixture(Duration::from_secs(60));
        f.store.set("a", "slow");
        f.store.set("b", "fast");
        let gate = f.store.hold("a");

        let parked = {
            let cache = Arc::clone(&f.cache);
            tokio::spawn(async move {
                cache
                    .resolve(&name("a"), &CallContext::background())
                    .await
                    .unwrap()
            })
        };
        f.store.entered.notified().await;

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            f.cache.resolve(&name("b"), &CallContext::background()),
        )
        .await
        .expect("b resolves while a is still being fetched")
        .unwrap();
        assert_eq!(other.as_deref().map(String::as_str), Some("FAST"));
        assert!(!parked.is_finished());

        gate.notify_one();
        let slow = parked.await.unwrap();
        assert_eq!(slow.as_deref().map(String::as_str), Some("SLOW"));
        assert_eq!(compiles(&f), 2);
    }

    #[tokio::test]
    async fn queued_readers_count_as_hits_not_misses() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let f = fixture(Duration::from_secs(60));
        f.store.set("hot", "payload");
        let gate = f.store.hold_gets();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&f.cache);
                tokio::spawn(async move {
                    cache
                        .resolve(&name("hot"), &CallContext::background())
                        .await
                        .unwrap()
                })
            })
            .collect();

        // One reader is parked in the store, the rest wait on the fill lock.
        f.store.entered.notified().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_one();
        for task in tasks {
            assert!(task.await.unwrap().is_some());
        }

        let snapshot = snapshotter.snapshot().into_vec();
        let counter = |metric: &str| {
            snapshot
                .iter()
                .find(|(key, _, _, _)| key.key().name() == metric)
                .map(|(_, _, _, value)| match value {
                    DebugValue::Counter(n) => *n,
                    other => panic!("{metric} is not a counter: {other:?}"),
                })
                .unwrap_or(0)
        };
        assert_eq!(counter(METRIC_CACHE_MISS), 1);
        assert_eq!(counter(METRIC_CACHE_HIT), 7);
    }

    #[tokio::test]
    async fn fill_racing_invalidate_does_not_install_stale_entry() {
        let f = fixture(Duration::from_secs(60));
        f.store.set("t", "old");
        let gate = f.store.hold_gets();

        let reader = {
            let cache = Arc::clone(&f.cache);
            tokio::spawn(async move {
                cache
                    .resolve(&name("t"), &CallContext::background())
                    .await
                    .unwrap()
            })
        };

        // The reader has fetched "old" and is parked inside the store call.
        f.store.entered.notified().await;
        f.store.set("t", "new");
        f.cache.invalidate(&name("t"));
        *f.store.gate.lock().unwrap() = None;
        gate.notify_one();

        let stale = reader.await.unwrap();
        assert_eq!(stale.as_deref().map(String::as_str), Some("OLD"));
        assert!(f.cache.is_empty(), "stale fill must not be installed");

        let fresh = f
            .cache
            .resolve(&name("t"), &CallContext::background())
            .await
            .unwrap();
        assert_eq!(fresh.as_deref().map(String::as_str), Some("NEW"));
    }

    #[tokio::test]
    async fn cancelled_fill_leaves_cache_empty() {
        let f = fixture(Duration::from_secs(60));
        f.store.set("t", "v");
        let _gate = f.store.hold_gets();
        let signal = CancelSignal::new();
        let ctx = CallContext::background().with_cancel(signal.clone());

        let reader = {
            let cache = Arc::clone(&f.cache);
            tokio::spawn(async move { cache.resolve(&name("t"), &ctx).await })
        };
        f.store.entered.notified().await;
        signal.cancel();

        let err = reader.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert!(f.cache.is_empty());
        assert_eq!(compiles(&f), 0);
    }

    #[tokio::test]
    async fn purge_removes_only_expired_entries() {
        let f = fixture(Duration::from_secs(10));
        f.store.set("a", "a");
        f.store.set("b", "b");
        let ctx = CallContext::background();

        f.cache.resolve(&name("a"), &ctx).await.unwrap();
        f.clock.advance(Duration::from_secs(6));
        f.cache.resolve(&name("b"), &ctx).await.unwrap();
        f.clock.advance(Duration::from_secs(6));

        assert_eq!(f.cache.purge_expired(), 1);
        assert_eq!(f.cache.slots.len(), 1);
        assert_eq!(f.cache.len(), 1);
    }
}
