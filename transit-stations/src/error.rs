pub type Result<T> = std::result::Result<T, StationError>;

#[derive(Debug, thiserror::Error)]
pub enum StationError {
    #[error(transparent)]
    Common(#[from] transit_common::CommonError),
    #[error("failed to read station catalogue file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse station catalogue JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
