//! Longbox
//!
//! Core library of the longbox comic manager: the naming/templating
//! engine, the post-download processing pipeline, and the search result
//! normalization and caching layer.

pub mod core;
pub mod db;

// Re-export commonly used types
pub use crate::core::{
    BlacklistManager, Config, ConvertWorker, ProcessingService, RenameWorker, SearchCache,
};
pub use db::DatabaseManager;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias for the library
pub type Result<T> = anyhow::Result<T>;
