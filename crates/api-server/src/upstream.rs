use crate::{
    error::{Error, Result},
    tools::{build_http_client, expand_template},
};
use common::{CacheSpec, Config};
use faststr::FastStr;
use reqwest::Client as ReqwestClient;
use serde_json::Value;
use std::path::Path;
use storage::{LoadError, Loader, PersistentCache};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type UpstreamCache = PersistentCache<FastStr, Value, UpstreamLoader>;

/// Fetches the JSON document for a key from an upstream URL template.
#[derive(Debug, Clone)]
pub struct UpstreamLoader {
    client:       ReqwestClient,
    url_template: FastStr,
}

impl UpstreamLoader {
    pub fn new(client: ReqwestClient, url_template: impl Into<FastStr>) -> Self {
        Self {
            client,
            url_template: url_template.into(),
        }
    }

    async fn fetch(&self, key: &str) -> Result<Value> {
        let url = expand_template(&self.url_template, key)?;
        debug!(url = %url, "requesting upstream");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

impl Loader<FastStr, Value> for UpstreamLoader {
    async fn load(
        &self,
        key: FastStr,
        cancel: CancellationToken,
    ) -> std::result::Result<Value, LoadError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled.into()),
            result = self.fetch(&key) => result.map_err(LoadError::from),
        }
    }
}

pub fn upstream_cache(
    spec: &CacheSpec,
    data_dir: &Path,
    client: ReqwestClient,
) -> UpstreamCache {
    PersistentCache::new(
        spec.name.clone(),
        data_dir,
        UpstreamLoader::new(client, spec.url_template.clone()),
    )
}

/// One cache per configured upstream, sharing a single HTTP client.
pub fn build_caches(config: &Config) -> Result<Vec<UpstreamCache>> {
    let client = build_http_client(config.upstream_timeout)?;
    Ok(config
        .caches
        .iter()
        .map(|spec| upstream_cache(spec, &config.data_dir, client.clone()))
        .collect())
}
