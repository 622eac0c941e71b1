//! # relaunch-core
//!
//! Core library for the relaunch launcher providing:
//! - Runtime configuration (YAML) with hierarchical precedence
//! - Launcher configuration (`launcher_config.json`) describing the artifact layout
//! - Error types shared by the other crates
//! - Retry execution engine with policy-based configuration

pub mod config;
pub mod error;
pub mod retry;
pub mod types;
pub mod utils;

pub use config::HierarchicalConfigLoader;
pub use error::{Error, Result};
pub use utils::get_home_dir;
