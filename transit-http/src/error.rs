/// Result type alias for the hardened HTTP client.
pub type Result<T> = std::result::Result<T, HttpError>;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The requested URL failed validation before any connection was made
    /// (scheme, host, port, blocked address range, blocked TLD).
    #[error("URL rejected: {0}")]
    UrlRejected(String),

    /// The TCP connection succeeded but the actually-connected peer
    /// address fell into a blocked range. Raised before any response byte
    /// reaches the caller.
    #[error("connection target rejected after DNS resolution: {0}")]
    RebindingRejected(String),

    /// A redirect was refused: too many hops, the target failed URL
    /// checks, or (logged, not fatal) a cross-origin hop stripped
    /// sensitive headers.
    #[error("redirect rejected: {0}")]
    RedirectRejected(String),

    /// The response exceeded the configured byte cap; the connection was
    /// closed without yielding further bytes.
    #[error("response exceeded size limit of {limit} bytes")]
    ResponseTooLarge { limit: u64 },

    /// Wall-clock time exceeded the configured total budget.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Network error, DNS failure, or TLS failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl HttpError {
    /// Whether this failure is worth retrying (spec §4.1: transport errors
    /// and `{429,500,502,503,504}` are retryable; validation failures and
    /// size/redirect violations are not).
    pub fn is_retryable(&self) -> bool {
        matches!(self, HttpError::Transport(_) | HttpError::Timeout(_))
    }
}
