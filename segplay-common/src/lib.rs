//! # segplay Common Library
//!
//! Shared code for the segplay crates including:
//! - Configuration file discovery and layered resolution
//! - Common error type
//! - Time conversion helpers used for cache keys and sweeps

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
