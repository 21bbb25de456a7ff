//! Core constants and I/O primitives shared across vpnazure crates.
//!
//! This crate provides:
//! - Protocol and timing default constants
//! - Error kind constants for log labeling
//! - Stream splicing and prefix-replay I/O helpers

pub mod defaults;
pub mod errors;
pub mod io;

// Re-export commonly used items at crate root
pub use defaults::*;
pub use errors::*;

/// Project name.
pub const PROJECT_NAME: &str = "vpnazure-rs";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
