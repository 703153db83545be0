pub mod common;
pub mod error;
pub mod municipal;
pub mod national_railway;
pub mod regional_authority;

pub use error::{ProviderError, Result};
pub use municipal::MunicipalProvider;
pub use national_railway::NationalRailwayProvider;
pub use regional_authority::{CredentialPlacement, RegionalAuthorityConfig, RegionalAuthorityProvider};
