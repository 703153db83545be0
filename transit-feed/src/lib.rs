pub mod error;
pub mod pipeline;
pub mod rss;

pub use error::{FeedError, Result};
pub use rss::FeedMeta;
