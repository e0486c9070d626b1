use faststr::FastStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("invalid upstream url: {0}")]
    InvalidUpstreamUrl(FastStr),

    #[error("upstream request cancelled")]
    Cancelled,

    #[error("failed to build client")]
    FailedToBuildClient,

    #[error("storage error: {0}")]
    Storage(#[from] storage::Error),

    #[error("server error: {0}")]
    Server(FastStr),
}

pub type Result<T> = std::result::Result<T, Error>;
