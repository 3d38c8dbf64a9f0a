use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Wrong value type at key {0}")]
    WrongType(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Tick encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Not a tick bucket key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Blocking write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum SamplingError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Buffered tick is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Disk(#[from] WriterError),
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid {field} timestamp {value:?}: {source}")]
    Timestamp {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Feed closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
