pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Common(#[from] transit_common::CommonError),
    #[error("io error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialise JSON: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("rate-limit lock on '{0}' could not be acquired")]
    LockTimeout(String),
}
