use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("{path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("cache record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache record is not valid protobuf: {0}")]
    Prost(#[from] prost::DecodeError),
    #[error(
        "cache at {dir:?} was built from different sources (digest {found} != expected {expected}); \
         refusing to serve a stale cache under strict integrity checking"
    )]
    Mismatch {
        dir: PathBuf,
        expected: String,
        found: String,
    },
    #[error("cache at {dir:?} is corrupt: {detail}")]
    Corrupt { dir: PathBuf, detail: String },
    #[error("model error: {0}")]
    Model(#[from] registry_model::ModelError),
}
