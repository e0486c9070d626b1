use faststr::FastStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value for {0}: {1}")]
    InvalidConfig(&'static str, FastStr),

    #[error("malformed cache definition: {0}")]
    InvalidCacheSpec(FastStr),

    #[error("duplicate cache name: {0}")]
    DuplicateCache(FastStr),
}

pub type Result<T> = std::result::Result<T, Error>;
