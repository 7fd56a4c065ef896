//! # romhold common library
//!
//! Shared code for the romhold workspace:
//! - Error type and result alias
//! - TOML configuration loading and config file resolution
//! - Pipeline event types and the broadcast event bus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
