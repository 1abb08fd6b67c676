//! # alconv Common Library
//!
//! Shared code for the alconv workspace:
//! - Common error type
//! - TOML configuration file model and discovery
//! - Configuration priority resolution

pub mod config;
pub mod error;

pub use config::{LoggingConfig, TomlConfig};
pub use error::{Error, Result};
