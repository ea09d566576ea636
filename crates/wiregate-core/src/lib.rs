//! # wiregate-core
//!
//! Shared functionality for the wiregate crates:
//!
//! - **Configuration**: loading, validation and persistence of the JSON5 config file
//! - **Errors**: configuration error types
//! - **Utilities**: path resolution, environment lookups and ID generation

pub mod config;
pub mod env;
pub mod error;
pub mod id;
pub mod paths;

// Re-exports for convenience
pub use config::Config;
pub use error::{ConfigError, Error, Result};
