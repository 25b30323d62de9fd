//! # Core Module
//!
//! The scan-and-classify engine, independent of any front end.
//!
//! ## Modules
//! - `scanner` - Walks target trees and recognises photo formats
//! - `metadata` - Extracts metadata with tiered fallback
//! - `session` - Runs a scan session and records it in the catalog
//! - `catalog` - Persists files, directories, sessions and logs
//! - `comparator` - Classifies directory pairs as duplicates
//! - `fixtures` - Generates a sample library for trying things out

pub mod catalog;
pub mod comparator;
pub mod fixtures;
pub mod metadata;
pub mod scanner;
pub mod session;

// Re-export commonly used types
pub use catalog::{CatalogStore, SessionSelector, SqliteCatalog};
pub use comparator::{DirectoryComparator, MatchClass, MatchPolicy};
pub use metadata::{ExtractorChain, PhotoMetadata};
pub use scanner::PhotoFormat;
pub use session::{ScanOrchestrator, ScanRequest, ScanTarget, SessionReport};
