use crate::error::LoadError;
use dashmap::{DashMap, mapref::entry::Entry};
use futures_util::future::{FutureExt, Shared};
use std::{hash::Hash, sync::Arc};
use tokio::sync::oneshot;

pub(crate) type Outcome<V> = Result<V, LoadError>;
pub(crate) type PendingLoad<V> = Shared<oneshot::Receiver<Outcome<V>>>;

/// In-flight loads keyed by cache key.
///
/// The map is sharded, so claiming a key only locks the shard it hashes to.
pub(crate) struct PendingLoads<K, V> {
    loads: Arc<DashMap<K, PendingLoad<V>>>,
}

pub(crate) enum Claim<K: Hash + Eq, V> {
    /// Another caller is already loading this key.
    Join(PendingLoad<V>),
    /// The caller became the sole loader and must deliver through `sender`.
    Lead {
        load:   PendingLoad<V>,
        sender: oneshot::Sender<Outcome<V>>,
        guard:  ClaimGuard<K, V>,
    },
    /// `recheck` found the value while the shard was locked.
    Ready(V),
}

impl<K, V> PendingLoads<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            loads: Arc::new(DashMap::new()),
        }
    }

    /// Joins or creates the pending load for `key`.
    ///
    /// `recheck` runs under the shard lock before a new load is created, which
    /// closes the window between a miss on the committed values and a load that
    /// finished and unregistered in the meantime.
    pub(crate) fn claim(&self, key: &K, recheck: impl FnOnce() -> Option<V>) -> Claim<K, V> {
        match self.loads.entry(key.clone()) {
            Entry::Occupied(entry) => Claim::Join(entry.get().clone()),
            Entry::Vacant(entry) => {
                if let Some(value) = recheck() {
                    return Claim::Ready(value);
                }
                let (sender, receiver) = oneshot::channel();
                let load = receiver.shared();
                entry.insert(load.clone());
                Claim::Lead {
                    load,
                    sender,
                    guard: ClaimGuard {
                        loads: self.loads.clone(),
                        key:   Some(key.clone()),
                    },
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.loads.len()
    }
}

/// Unregisters the pending load when released or dropped, so a load task that
/// dies early never leaves a dead entry behind.
pub(crate) struct ClaimGuard<K: Hash + Eq, V> {
    loads: Arc<DashMap<K, PendingLoad<V>>>,
    key:   Option<K>,
}

impl<K: Hash + Eq, V> ClaimGuard<K, V> {
    pub(crate) fn release(mut self) {
        if let Some(key) = self.key.take() {
            self.loads.remove(&key);
        }
    }
}

impl<K: Hash + Eq, V> Drop for ClaimGuard<K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.loads.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_claim_joins() {
        let pending: PendingLoads<String, u32> = PendingLoads::new();
        let key = "k".to_owned();

        let Claim::Lead { sender, guard, .. } = pending.claim(&key, || None) else {
            panic!("first claim must lead");
        };
        let Claim::Join(joined) = pending.claim(&key, || Some(1)) else {
            panic!("second claim must join");
        };
        assert_eq!(pending.len(), 1);

        guard.release();
        assert_eq!(pending.len(), 0);
        sender.send(Ok(7)).unwrap();
        assert_eq!(joined.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_recheck_short_circuits() {
        let pending: PendingLoads<String, u32> = PendingLoads::new();
        assert!(matches!(
            pending.claim(&"k".to_owned(), || Some(3)),
            Claim::Ready(3)
        ));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_guard_unregisters() {
        let pending: PendingLoads<String, u32> = PendingLoads::new();
        let key = "k".to_owned();
        let Claim::Lead { load, sender, guard } = pending.claim(&key, || None) else {
            panic!("first claim must lead");
        };
        drop(guard);
        drop(sender);
        assert_eq!(pending.len(), 0);
        assert!(load.await.is_err());
        assert!(matches!(pending.claim(&key, || None), Claim::Lead { .. }));
    }
}
