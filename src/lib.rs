//! voxrelay - chat and speech relay for a browser voice bot
//!
//! This library provides the core functionality for the voxrelay server,
//! including configuration, upstream clients, and the HTTP relay.

pub mod config;
pub mod error;
pub mod prompt;
pub mod provider;
pub mod proxy;

pub use config::Config;
pub use error::{Error, Result};
