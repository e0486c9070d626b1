use crate::error::Result;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::HashMap,
    ffi::OsString,
    hash::Hash,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

/// Durable home of one cache's full key/value mapping.
pub trait PersistenceStore<K, V>: Send + Sync + 'static {
    /// Never fails: a missing or unreadable source yields an empty mapping.
    fn load(&self) -> impl Future<Output = HashMap<K, V>> + Send;

    /// Replaces the stored mapping with `mapping`.
    fn save(&self, mapping: &HashMap<K, V>) -> impl Future<Output = Result<()>> + Send;
}

/// Stores the mapping as a JSON object in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/<name>.json`
    pub fn for_cache(data_dir: impl AsRef<Path>, name: &str) -> Self {
        Self::new(data_dir.as_ref().join(format!("{name}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_mapping<K, V>(&self) -> Result<Option<HashMap<K, V>>>
    where
        K: DeserializeOwned + Eq + Hash,
        V: DeserializeOwned,
    {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn write_atomic(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp, &self.path).await {
            warn!(path = %self.path.display(), error = %e, "atomic replace failed, overwriting in place");
            let _ = fs::remove_file(&temp).await;
            fs::write(&self.path, data).await?;
        }
        Ok(())
    }
}

impl<K, V> PersistenceStore<K, V> for JsonFileStore
where
    K: Serialize + DeserializeOwned + Eq + Hash + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> HashMap<K, V> {
        match self.read_mapping().await {
            Ok(Some(mapping)) => {
                debug!(path = %self.path.display(), entries = mapping.len(), "backing file loaded");
                mapping
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "no backing file yet, starting empty");
                HashMap::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "backing file unreadable, starting empty");
                HashMap::new()
            }
        }
    }

    async fn save(&self, mapping: &HashMap<K, V>) -> Result<()> {
        let data = serde_json::to_vec_pretty(mapping)?;
        self.write_atomic(&data).await?;
        debug!(path = %self.path.display(), entries = mapping.len(), "backing file written");
        Ok(())
    }
}
