//! LogVault Core - Configuration model, on-disk layout and error handling

pub mod config;
pub mod constants;
pub mod error;
pub mod layout;

pub use config::*;
pub use constants::*;
pub use error::{ConfigError, Result};
pub use layout::{BundleName, RotatedName};
