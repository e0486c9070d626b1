mod cache;

pub mod error;
pub mod loader;
pub mod registry;
pub mod store;

pub use cache::PersistentCache;
pub use error::{Error, LoadError, Result};
pub use loader::Loader;
pub use registry::{CacheRegistry, ManagedCache};
pub use store::{JsonFileStore, PersistenceStore};
pub use tokio_util::sync::CancellationToken;
