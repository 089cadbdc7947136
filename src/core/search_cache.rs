//! Search and metadata cache
//!
//! File-backed TTL cache for expensive upstream calls. Each entry is one
//! JSON file under a namespace directory; the file stem is the SHA-256 of
//! `"{namespace}:{semantic key}"`, which bounds filename length and keeps
//! arbitrary key content filesystem-safe. Expiry is driven by file mtime.
//!
//! The cache is an optimization, never a correctness dependency: every
//! I/O failure degrades to a miss or a skipped write.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Cache namespaces with independent TTLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    /// Raw indexer search responses
    IndexerResults,
    /// Metadata provider lookups and searches
    Metadata,
    /// Presence markers for files already downloaded; never expires
    DownloadedFiles,
}

impl CacheNamespace {
    pub fn dir_name(&self) -> &'static str {
        match self {
            CacheNamespace::IndexerResults => "indexer_results",
            CacheNamespace::Metadata => "metadata",
            CacheNamespace::DownloadedFiles => "downloaded_files",
        }
    }

    fn from_dir_name(name: &str) -> Option<Self> {
        match name {
            "indexer_results" => Some(CacheNamespace::IndexerResults),
            "metadata" => Some(CacheNamespace::Metadata),
            "downloaded_files" => Some(CacheNamespace::DownloadedFiles),
            _ => None,
        }
    }
}

/// File-backed cache manager
pub struct SearchCache {
    root: PathBuf,
    indexer_results_ttl: Duration,
    metadata_ttl: Duration,
}

impl SearchCache {
    /// Create a cache rooted at `root`, creating the namespace directories
    pub fn new(
        root: PathBuf,
        indexer_results_ttl: Duration,
        metadata_ttl: Duration,
    ) -> std::io::Result<Self> {
        for namespace in [
            CacheNamespace::IndexerResults,
            CacheNamespace::Metadata,
            CacheNamespace::DownloadedFiles,
        ] {
            std::fs::create_dir_all(root.join(namespace.dir_name()))?;
        }

        Ok(Self {
            root,
            indexer_results_ttl,
            metadata_ttl,
        })
    }

    /// TTL for a namespace; None means entries never expire
    fn ttl_for(&self, namespace: CacheNamespace) -> Option<Duration> {
        match namespace {
            CacheNamespace::IndexerResults => Some(self.indexer_results_ttl),
            CacheNamespace::Metadata => Some(self.metadata_ttl),
            CacheNamespace::DownloadedFiles => None,
        }
    }

    fn entry_path(&self, namespace: CacheNamespace, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", namespace.dir_name(), key).as_bytes());
        let stem = format!("{:x}", hasher.finalize());
        self.root
            .join(namespace.dir_name())
            .join(format!("{}.json", stem))
    }

    /// Read a cached value; expired entries are deleted and report a miss
    pub async fn get(&self, namespace: CacheNamespace, key: &str) -> Option<Value> {
        let path = self.entry_path(namespace, key);

        let metadata = tokio::fs::metadata(&path).await.ok()?;
        if let Some(ttl) = self.ttl_for(namespace) {
            let expired = metadata
                .modified()
                .ok()
                .and_then(|mtime| mtime.elapsed().ok())
                .map(|age| age > ttl)
                .unwrap_or(false);
            if expired {
                debug!(path = %path.display(), "Cache entry expired");
                remove_entry(&path).await;
                return None;
            }
        }

        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache entry");
                return None;
            }
        };

        match serde_json::from_slice(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt cache entry, dropping");
                remove_entry(&path).await;
                None
            }
        }
    }

    /// Store a value; failures are logged and skipped
    pub async fn store(&self, namespace: CacheNamespace, key: &str, value: &Value) {
        let path = self.entry_path(namespace, key);

        let contents = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize cache value");
                return;
            }
        };

        if let Err(e) = tokio::fs::write(&path, contents).await {
            warn!(path = %path.display(), error = %e, "Failed to write cache entry");
        }
    }

    /// Mark a download as seen; only presence matters for this namespace
    pub async fn mark_downloaded(&self, key: &str) {
        self.store(CacheNamespace::DownloadedFiles, key, &Value::Bool(true))
            .await;
    }

    /// Check the permanent download-dedup marker
    pub async fn is_downloaded(&self, key: &str) -> bool {
        self.get(CacheNamespace::DownloadedFiles, key).await.is_some()
    }

    /// Sweep every namespace directory and delete expired entries
    ///
    /// Returns the number of files removed. Safe to run at any time;
    /// unreadable files are skipped with a warning.
    pub fn purge_expired(&self) -> usize {
        let mut removed = 0;

        for entry in WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let namespace = entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
                .and_then(CacheNamespace::from_dir_name);

            let ttl = match namespace.and_then(|ns| self.ttl_for(ns)) {
                Some(ttl) => ttl,
                None => continue,
            };

            let expired = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|mtime| mtime.elapsed().ok())
                .map(|age| age > ttl)
                .unwrap_or(false);

            if expired {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "Failed to purge cache entry");
                    }
                }
            }
        }

        removed
    }
}

async fn remove_entry(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to delete cache entry");
    }
}
