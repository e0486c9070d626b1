pub use common::logging_stdout;
use error::{Error, Result};
use faststr::FastStr;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use storage::CacheRegistry;
use tokio_util::sync::CancellationToken;
use volo_http::Address;
use volo_http::server::{Router, Server};
use volo_http::utils::Extension;

pub mod error;
pub mod handlers;
#[cfg(test)]
mod mock;
pub mod tools;
pub mod upstream;

pub use upstream::{UpstreamCache, UpstreamLoader, build_caches};

/// Shared by every handler through an `Extension` layer.
#[derive(Clone)]
pub struct AppState {
    caches:   Arc<HashMap<FastStr, UpstreamCache>>,
    registry: CacheRegistry,
    shutdown: CancellationToken,
}

impl AppState {
    /// `shutdown` aborts in-flight lookups and is what loaders observe.
    pub fn new(caches: Vec<UpstreamCache>, shutdown: CancellationToken) -> Result<Self> {
        let mut registry = CacheRegistry::new();
        let mut by_name = HashMap::with_capacity(caches.len());
        for cache in caches {
            registry.register(cache.clone())?;
            by_name.insert(FastStr::new(cache.name()), cache);
        }
        Ok(Self {
            caches: Arc::new(by_name),
            registry,
            shutdown,
        })
    }

    pub fn cache(&self, name: &str) -> Option<&UpstreamCache> {
        self.caches.get(name)
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}

pub async fn run_api_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = Router::new()
        .merge(handlers::lookup_router())
        .merge(handlers::caches_router())
        .layer(Extension(state));
    let addr = Address::from(addr);
    Server::new(app)
        .run(addr)
        .await
        .map_err(|e| Error::Server(e.to_string().into()))
}
