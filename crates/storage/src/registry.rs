use crate::{
    PersistentCache,
    error::{Error, Result},
    loader::Loader,
    store::PersistenceStore,
};
use futures_util::future::{BoxFuture, join_all};
use std::{fmt::Debug, hash::Hash, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Lifecycle surface shared by every cache regardless of key and value types.
pub trait ManagedCache: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn initialize<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, ()>;

    fn flush(&self) -> BoxFuture<'_, Result<()>>;

    fn is_initialized(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, L, S> ManagedCache for PersistentCache<K, V, L, S>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: Loader<K, V>,
    S: PersistenceStore<K, V>,
{
    fn name(&self) -> &str {
        PersistentCache::name(self)
    }

    fn initialize<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, ()> {
        Box::pin(PersistentCache::initialize(self, cancel))
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(PersistentCache::flush(self))
    }

    fn is_initialized(&self) -> bool {
        PersistentCache::is_initialized(self)
    }

    fn len(&self) -> usize {
        PersistentCache::len(self)
    }
}

/// The set of caches owned by the host process, in registration order.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: Vec<Arc<dyn ManagedCache>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cache: impl ManagedCache) -> Result<()> {
        if self.get(cache.name()).is_some() {
            return Err(Error::DuplicateCache(cache.name().to_owned().into()));
        }
        self.caches.push(Arc::new(cache));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ManagedCache>> {
        self.caches.iter().find(|cache| cache.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ManagedCache>> {
        self.caches.iter()
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Loads every backing file. Run once at startup, before serving traffic.
    pub async fn initialize_all(&self, cancel: &CancellationToken) {
        join_all(self.caches.iter().map(|cache| cache.initialize(cancel))).await;
        info!(caches = self.caches.len(), "all caches initialized");
    }

    /// Flushes every cache, giving up after `grace`. Failures are logged.
    ///
    /// Returns `false` if the grace period ran out first.
    pub async fn flush_all(&self, grace: Duration) -> bool {
        let flushes = self.caches.iter().map(|cache| async move {
            if let Err(e) = cache.flush().await {
                error!(cache = %cache.name(), error = %e, "failed to flush cache");
            }
        });

        match tokio::time::timeout(grace, join_all(flushes)).await {
            Ok(_) => {
                info!(caches = self.caches.len(), "all caches flushed");
                true
            }
            Err(_) => {
                warn!(grace = ?grace, "grace period elapsed before all caches were flushed");
                false
            }
        }
    }
}
