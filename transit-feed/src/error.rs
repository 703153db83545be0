pub type Result<T> = std::result::Result<T, FeedError>;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error(transparent)]
    Common(#[from] transit_common::CommonError),
    #[error(transparent)]
    Cache(#[from] transit_cache::CacheError),
    #[error("failed to build RSS XML: {0}")]
    Xml(#[from] quick_xml::Error),
}
