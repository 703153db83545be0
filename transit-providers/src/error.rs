pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Common(#[from] transit_common::CommonError),
    #[error(transparent)]
    Cache(#[from] transit_cache::CacheError),
    #[error(transparent)]
    Http(#[from] transit_http::HttpError),
    #[error("daily request budget would be exceeded; refusing to start")]
    BudgetExceeded,
    #[error("per-run request ceiling exceeded; aborting refresh")]
    CircuitBroken,
    #[error("upstream payload could not be parsed: {0}")]
    Parse(String),
}
