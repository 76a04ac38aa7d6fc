//! Common test infrastructure for hostpack-update tests
//!
//! # Usage
//!
//! In your test file, add:
//! ```ignore
//! mod common;
//! use common::*;
//! ```
//!
//! # Modules
//!
//! - `builders`: Fluent builder for release feed JSON
//! - `mock_server`: Wiremock setup helpers for the release feed and downloads
//! - `fixtures`: Deployment trees, update contexts and package archives

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod builders;
pub mod fixtures;
pub mod mock_server;

pub use builders::*;
pub use fixtures::*;
pub use mock_server::*;
