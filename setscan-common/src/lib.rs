//! # setscan Common Library
//!
//! Shared code for the setscan crates:
//! - Error and result types
//! - TOML configuration model, resolution and validation
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod time;

pub use config::TomlConfig;
pub use error::{Error, Result};
