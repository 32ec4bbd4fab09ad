//! # Spice Common Library
//!
//! Shared code for the spice services:
//! - Error type used by configuration and startup code
//! - TOML configuration model and credential resolution
//! - Logging bootstrap

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
