mod pending;

use crate::{
    error::{Error, LoadError, Result},
    loader::Loader,
    store::{JsonFileStore, PersistenceStore},
};
use faststr::FastStr;
use futures_util::FutureExt;
use moka::sync::Cache;
use pending::{Claim, ClaimGuard, Outcome, PendingLoads};
use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    panic::AssertUnwindSafe,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A lazily populated, file-backed key/value cache.
///
/// Values are computed by the [`Loader`] on first request, kept in memory for
/// the lifetime of the process and written back to the [`PersistenceStore`].
/// Entries never expire and are never evicted.
///
/// Call [`initialize`](Self::initialize) once before serving traffic. Until
/// then the cache behaves as empty and defers every write to the store, so an
/// uninitialized instance can never clobber a backing file it has not read.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct PersistentCache<K, V, L, S = JsonFileStore> {
    inner: Arc<Inner<K, V, L, S>>,
}

struct Inner<K, V, L, S> {
    name:        FastStr,
    memory:      Cache<K, V>,
    pending:     PendingLoads<K, V>,
    loader:      L,
    store:       S,
    // parent of every loader token; follows the token given to `initialize`
    lifecycle:   CancellationToken,
    initialized: AtomicBool,
    // bumped on every commit; `persisted` holds the generation last written
    generation:  AtomicU64,
    persisted:   Mutex<u64>,
}

impl<K, V, L, S> Clone for PersistentCache<K, V, L, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, L> PersistentCache<K, V, L>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: Loader<K, V>,
    JsonFileStore: PersistenceStore<K, V>,
{
    /// Backs the cache with `<data_dir>/<name>.json`.
    pub fn new(name: impl Into<FastStr>, data_dir: impl AsRef<Path>, loader: L) -> Self {
        let name = name.into();
        let store = JsonFileStore::for_cache(data_dir, &name);
        Self::with_store(name, store, loader)
    }
}

impl<K, V, L, S> PersistentCache<K, V, L, S>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: Loader<K, V>,
    S: PersistenceStore<K, V>,
{
    pub fn with_store(name: impl Into<FastStr>, store: S, loader: L) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(Inner {
                memory: Cache::builder().name(&name).build(),
                name,
                pending: PendingLoads::new(),
                loader,
                store,
                lifecycle: CancellationToken::new(),
                initialized: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                persisted: Mutex::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Loads the backing store into memory.
    ///
    /// `cancel` is the process lifetime signal; loaders receive child tokens of
    /// it, including loads started before this call. Entries committed before
    /// initialization win over stored ones.
    /// Calling this more than once is a no-op.
    pub async fn initialize(&self, cancel: &CancellationToken) {
        let inner = &self.inner;
        let persisted = inner.persisted.lock().await;
        if inner.initialized.load(Ordering::Acquire) {
            debug!(cache = %inner.name, "cache already initialized");
            return;
        }

        inner.follow(cancel);
        let mapping = inner.store.load().await;
        let loaded = mapping.len();
        for (key, value) in mapping {
            inner.memory.entry(key).or_insert(value);
        }
        inner.initialized.store(true, Ordering::Release);
        drop(persisted);

        info!(cache = %inner.name, entries = loaded, "cache initialized");

        if inner.generation.load(Ordering::Acquire) > 0 {
            Inner::spawn_persist(inner.clone());
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Returns the cached value for `key`, loading it on a miss.
    ///
    /// A hit completes on first poll. On a miss every concurrent caller for the
    /// same key shares one loader invocation and receives the same outcome.
    /// Failures are not remembered: the next call after a failed load starts a
    /// new one.
    ///
    /// Cancelling `cancel` (or dropping the returned future) only abandons this
    /// caller's wait. The load keeps running and its value is still committed.
    pub async fn get(&self, key: &K, cancel: &CancellationToken) -> Result<V> {
        let inner = &self.inner;
        if let Some(value) = inner.memory.get(key) {
            return Ok(value);
        }

        let load = match inner.pending.claim(key, || inner.memory.get(key)) {
            Claim::Ready(value) => return Ok(value),
            Claim::Join(load) => {
                debug!(cache = %inner.name, key = ?key, "joining pending load");
                load
            }
            Claim::Lead {
                load,
                sender,
                guard,
            } => {
                self.spawn_load(key.clone(), sender, guard);
                load
            }
        };

        tokio::select! {
            biased;
            outcome = load => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(Error::Load(e)),
                Err(_) => Err(Error::Abandoned),
            },
            _ = cancel.cancelled() => {
                debug!(cache = %inner.name, key = ?key, "caller stopped waiting for load");
                Err(Error::Cancelled)
            }
        }
    }

    /// Hit-only lookup; never loads.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.memory.get(key)
    }

    pub fn len(&self) -> usize {
        self.inner.memory.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of loads currently in flight.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.len()
    }

    /// Writes the in-memory mapping to the store if anything changed since the
    /// last write. Does nothing before initialization.
    pub async fn flush(&self) -> Result<()> {
        if self.inner.persist().await? {
            info!(cache = %self.inner.name, "cache flushed");
        } else {
            debug!(cache = %self.inner.name, "nothing to flush");
        }
        Ok(())
    }

    // The load runs on its own task so it survives the caller that started it.
    fn spawn_load(
        &self,
        key: K,
        sender: oneshot::Sender<Outcome<V>>,
        guard: ClaimGuard<K, V>,
    ) {
        let inner = self.inner.clone();
        let cancel = inner.lifecycle.child_token();
        debug!(cache = %inner.name, key = ?key, "loading missing key");

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(inner.loader.load(key.clone(), cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(LoadError::msg("loader panicked")));

            let committed = match &outcome {
                Ok(value) => {
                    inner.memory.insert(key.clone(), value.clone());
                    inner.generation.fetch_add(1, Ordering::AcqRel);
                    debug!(cache = %inner.name, key = ?key, "value committed");
                    true
                }
                Err(e) => {
                    warn!(cache = %inner.name, key = ?key, error = %e, "load failed");
                    false
                }
            };

            // commit, then unregister, then wake waiters
            guard.release();
            let _ = sender.send(outcome);

            if committed {
                Inner::spawn_persist(inner);
            }
        });
    }
}

impl<K, V, L, S> Inner<K, V, L, S>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: Loader<K, V>,
    S: PersistenceStore<K, V>,
{
    fn follow(&self, parent: &CancellationToken) {
        if parent.is_cancelled() {
            self.lifecycle.cancel();
            return;
        }
        let parent = parent.clone();
        let lifecycle = self.lifecycle.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => lifecycle.cancel(),
                _ = lifecycle.cancelled() => {}
            }
        });
    }

    fn spawn_persist(this: Arc<Self>) {
        tokio::spawn(async move {
            if let Err(e) = this.persist().await {
                error!(cache = %this.name, error = %e, "failed to persist cache");
            }
        });
    }

    /// Returns whether the store was written. Concurrent calls serialize on
    /// `persisted`, and a call that finds its commits already written skips.
    async fn persist(&self) -> Result<bool> {
        let mut persisted = self.persisted.lock().await;
        if !self.initialized.load(Ordering::Acquire) {
            debug!(cache = %self.name, "cache not initialized, deferring write");
            return Ok(false);
        }

        let target = self.generation.load(Ordering::Acquire);
        if *persisted >= target {
            return Ok(false);
        }

        let snapshot: HashMap<K, V> = self
            .memory
            .iter()
            .map(|(key, value)| (K::clone(&key), value))
            .collect();
        self.store.save(&snapshot).await?;
        *persisted = target;
        debug!(cache = %self.name, entries = snapshot.len(), generation = target, "cache persisted");
        Ok(true)
    }
}
