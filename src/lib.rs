//! # Photo Catalog
//!
//! Catalogs photo collections spread over a working library and old backup
//! drives, then classifies directories as exact duplicates, partial
//! duplicates or uniquely present.
//!
//! ## Core Philosophy
//! - **Never touch the photos** - scans only read; nothing is moved or deleted
//! - **Keep going** - one unreadable file never stops a multi-terabyte scan
//! - **Additive history** - every scan is its own session; re-scans never
//!   overwrite earlier ones
//!
//! ## Architecture
//! - `core` - Scanner, metadata extraction, sessions, catalog and comparator
//! - `config` - YAML scan targets and settings
//! - `events` - Event-driven progress reporting
//! - `error` - Error types

pub mod config;
pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{CatalogError, Result};

/// Initialize tracing for the library
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` when verbose.
/// Calling this more than once is harmless.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
