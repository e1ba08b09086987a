//! Mise Core: error type, service configuration and shared recipe types.

pub mod config;
pub mod error;
pub mod types;

pub use config::{DataPaths, MiseConfig};
pub use error::{Error, Result};
pub use types::*;
