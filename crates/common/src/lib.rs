pub mod config;
pub mod error;

mod log;

pub use config::{CacheSpec, Config};
pub use log::logging_stdout;
