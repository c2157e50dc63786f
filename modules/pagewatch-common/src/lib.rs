pub mod config;
pub mod error;
pub mod types;

pub use config::{provider_profile, Config, ProviderProfile};
pub use error::PageWatchError;
pub use types::*;
