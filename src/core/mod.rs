//! Core business logic module
//!
//! This module provides the application layer of longbox:
//! - Naming engine and filesystem-name sanitization
//! - Post-processing orchestration and the rename/conversion workers
//! - Search result normalization, caching, and blacklisting
//! - Configuration management
//! - Structured logging system
//! - Error handling and type system

pub mod blacklist;
pub mod config;
pub mod convert_worker;
pub mod error;
pub mod logging;
pub mod naming;
pub mod normalizer;
pub mod processing;
pub mod rename_worker;
pub mod sanitize;
pub mod search_cache;

pub use blacklist::BlacklistManager;
pub use config::Config;
pub use convert_worker::ConvertWorker;
pub use error::{ErrorContext, LongboxError, Result};
pub use logging::Logger;
pub use naming::{clean_title, format_issue_number, parse_release_datetime, FormatValue};
pub use normalizer::{normalize, IndexerDescriptor, IndexerKind, SearchResult, SourceType};
pub use processing::ProcessingService;
pub use rename_worker::RenameWorker;
pub use sanitize::{sanitize_filename, sanitize_folder};
pub use search_cache::{CacheNamespace, SearchCache};
