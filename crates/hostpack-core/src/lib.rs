//! # hostpack-core
//!
//! Core library for hostpack providing:
//! - Configuration file parsing (hostpack.yaml)
//! - Runtime configuration types (network timeouts, release feed, layout,
//!   exclusion rule sets, backup policy, post-update tasks)
//! - Shared utilities

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::HostpackConfig;
pub use error::{Error, Result};
pub use utils::get_home_dir;
