/// Result type alias used throughout the configuration and path-guard layer.
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("path '{path}' resolves outside the allowlisted roots {allowed:?}")]
    PathNotAllowed { path: String, allowed: &'static [&'static str] },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
