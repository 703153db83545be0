pub mod client;
pub mod error;
pub mod redact;
pub mod security;

pub use client::{HardenedClient, Request, Response};
pub use error::{HttpError, Result};
pub use redact::{is_sensitive_key, redact, redact_header, redact_url};
pub use security::UrlValidator;
