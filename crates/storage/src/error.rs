use faststr::FastStr;
use std::{fmt, sync::Arc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("load failed: {0}")]
    Load(LoadError),

    #[error("wait for cached value was cancelled")]
    Cancelled,

    #[error("load task ended without delivering a result")]
    Abandoned,

    #[error("duplicate cache name: {0}")]
    DuplicateCache(FastStr),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A loader failure shared by every waiter of the same pending load.
///
/// Clones point at the same underlying error. Does not implement
/// `std::error::Error`; any error type converts into it with `?`.
#[derive(Clone)]
pub struct LoadError(Arc<dyn std::error::Error + Send + Sync>);

impl LoadError {
    pub fn msg(message: impl Into<FastStr>) -> Self {
        Self(Arc::new(MsgError(message.into())))
    }

    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.0
    }

    /// Whether two handles refer to the same failure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<E> From<E> for LoadError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(e: E) -> Self {
        Self(Arc::new(e))
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MsgError(FastStr);
