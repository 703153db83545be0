pub mod atomic_write;
pub mod cache_store;
pub mod error;
pub mod first_seen;
pub mod rate_limit;

pub use cache_store::CacheStore;
pub use error::{CacheError, Result};
pub use first_seen::FirstSeenStore;
pub use rate_limit::RateLimitCounter;
