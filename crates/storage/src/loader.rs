use crate::error::LoadError;
use tokio_util::sync::CancellationToken;

/// Computes the value for a missing key, typically by calling an upstream API.
///
/// Invoked at most once at a time per key. The token is cancelled when the
/// owning cache's lifecycle ends, not when an individual caller gives up.
pub trait Loader<K, V>: Send + Sync + 'static {
    fn load(
        &self,
        key: K,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<V, LoadError>> + Send;
}

impl<K, V, F, Fut, E> Loader<K, V> for F
where
    K: Send + 'static,
    F: Fn(K, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send,
    E: Into<LoadError>,
{
    async fn load(&self, key: K, cancel: CancellationToken) -> Result<V, LoadError> {
        (self)(key, cancel).await.map_err(Into::into)
    }
}
