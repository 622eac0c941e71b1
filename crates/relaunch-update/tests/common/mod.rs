//! Common test infrastructure for relaunch-update tests
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::*;
//! ```
//!
//! # Modules
//!
//! - `constants`: Tags, digests and payload bytes
//! - `builders`: Release JSON and launcher config builders
//! - `mock_server`: Wiremock setup helpers
//! - `fixtures`: Archives and install-root layouts on disk
//! - `fakes`: Recording listener, fake processes and flaky file operations

// Not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod builders;
pub mod constants;
pub mod fakes;
pub mod fixtures;
pub mod mock_server;

pub use builders::*;
pub use constants::*;
pub use fakes::*;
pub use fixtures::*;
pub use mock_server::*;
