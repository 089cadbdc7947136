//! Database models
//!
//! Data structures representing database tables, plus the per-library
//! settings blob stored inside the library row.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Library record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: String,
    pub name: String,
    /// Absolute path all volume folders live under
    pub root_path: String,
    /// MediaSettings JSON blob; None means all defaults
    pub settings: Option<String>,
    pub created_at: String,
}

/// Comic volume (series entry) record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub library_id: String,
    pub title: String,
    pub volume_number: Option<i32>,
    pub year: Option<i32>,
    pub publisher: Option<String>,
    /// "TPB", "One-Shot", "Hard Cover" and friends
    pub special_version: Option<String>,
    /// Library-root-relative folder, once one has been generated
    pub folder: Option<String>,
    pub created_at: String,
}

/// Single issue of a volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub volume_id: String,
    /// Kept as text: "7", "1.5" and "Annual" are all valid issue numbers
    pub issue_number: Option<String>,
    pub title: Option<String>,
    pub release_date: Option<String>,
    /// Library-root-relative path of the issue file, if on disk
    pub file_path: Option<String>,
    pub status: String,
    pub created_at: String,
}

/// Issue status values this core reads and writes
pub mod issue_status {
    /// Fresh download, not yet processed
    pub const DOWNLOADED: &str = "downloaded";
    /// Intermediate pipeline stage done, another follows
    pub const PROCESSED: &str = "processed";
    /// Pipeline finished
    pub const READY: &str = "ready";
}

/// Processing job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Renaming,
    Converting,
    Completed,
    Failed,
    Retry,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Renaming => "renaming",
            JobStatus::Converting => "converting",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retry => "retry",
        }
    }

    pub fn from_str(status: &str) -> Self {
        match status {
            "renaming" => JobStatus::Renaming,
            "converting" => JobStatus::Converting,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "retry" => JobStatus::Retry,
            _ => JobStatus::Queued,
        }
    }

    /// Statuses counted against the one-active-job-per-issue invariant
    pub fn is_active(&self) -> bool {
        !matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Statuses a worker may pick the job up in
    pub fn is_processable(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Retry)
    }
}

/// Rename job row
///
/// Rows are never deleted; completed and failed jobs stay queryable as an
/// audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameJob {
    pub id: String,
    pub volume_id: String,
    pub issue_id: String,
    pub issue_number: Option<String>,
    /// Library-root-relative
    pub source_file_path: String,
    pub target_file_path: Option<String>,
    pub status: String,
    pub error: Option<String>,
    /// Epoch seconds of the last status transition
    pub updated_at: i64,
    pub created_at: String,
}

/// Conversion job row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: String,
    pub volume_id: String,
    pub issue_id: String,
    pub issue_number: Option<String>,
    pub source_file_path: String,
    pub target_file_path: Option<String>,
    pub target_format: String,
    pub status: String,
    pub error: Option<String>,
    pub updated_at: i64,
    pub created_at: String,
}

/// Which pipeline stage runs first after a download completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingOrder {
    #[default]
    RenameThenConvert,
    ConvertThenRename,
}

/// Per-library processing configuration, stored in `Library.settings`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub rename_downloaded_files: bool,
    pub convert: bool,
    pub processing_order: ProcessingOrder,
    pub volume_folder_naming: String,
    pub file_naming: String,
    pub file_naming_special_version: String,
    pub file_naming_empty: String,
    /// Preferred formats, best first; the head is the conversion target
    pub format_preference: Vec<String>,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            rename_downloaded_files: true,
            convert: false,
            processing_order: ProcessingOrder::RenameThenConvert,
            volume_folder_naming: "{Series Title}/Volume {Volume Number} ({Year})".to_string(),
            file_naming: "{Series Title} ({Year}) Issue {Issue}".to_string(),
            file_naming_special_version: "{Series Title} ({Year}) {Special Version}".to_string(),
            file_naming_empty: "{Series Title} ({Year})".to_string(),
            format_preference: vec!["cbz".to_string()],
        }
    }
}

impl MediaSettings {
    /// Parse the settings blob of a library row
    ///
    /// An absent or unreadable blob falls back to defaults; a library must
    /// always have workable settings.
    pub fn from_blob(blob: Option<&str>) -> Self {
        match blob {
            Some(raw) if !raw.trim().is_empty() => match serde_json::from_str(raw) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(error = %e, "Unreadable media settings blob, using defaults");
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// The conversion target format
    pub fn target_format(&self) -> &str {
        self.format_preference
            .first()
            .map(String::as_str)
            .unwrap_or("cbz")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Renaming,
            JobStatus::Converting,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Retry,
        ] {
            assert_eq!(JobStatus::from_str(status.as_str()), status);
        }
        assert_eq!(JobStatus::from_str("garbage"), JobStatus::Queued);
    }

    #[test]
    fn test_job_status_classification() {
        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Renaming.is_active());
        assert!(JobStatus::Retry.is_active());
        assert!(!JobStatus::Completed.is_active());
        assert!(!JobStatus::Failed.is_active());

        assert!(JobStatus::Queued.is_processable());
        assert!(JobStatus::Retry.is_processable());
        assert!(!JobStatus::Renaming.is_processable());
        assert!(!JobStatus::Completed.is_processable());
    }

    #[test]
    fn test_media_settings_defaults() {
        let settings = MediaSettings::from_blob(None);
        assert!(settings.rename_downloaded_files);
        assert!(!settings.convert);
        assert_eq!(settings.processing_order, ProcessingOrder::RenameThenConvert);
        assert_eq!(settings.target_format(), "cbz");
    }

    #[test]
    fn test_media_settings_partial_blob() {
        let settings = MediaSettings::from_blob(Some(
            r#"{"convert": true, "processing_order": "convert_then_rename"}"#,
        ));
        assert!(settings.convert);
        assert_eq!(settings.processing_order, ProcessingOrder::ConvertThenRename);
        // Unspecified fields keep defaults
        assert!(settings.rename_downloaded_files);
        assert_eq!(settings.file_naming, "{Series Title} ({Year}) Issue {Issue}");
    }

    #[test]
    fn test_media_settings_garbage_blob_falls_back() {
        let settings = MediaSettings::from_blob(Some("{nope"));
        assert!(settings.rename_downloaded_files);
        let settings = MediaSettings::from_blob(Some("   "));
        assert_eq!(settings.target_format(), "cbz");
    }

    #[test]
    fn test_media_settings_unknown_fields_ignored() {
        let settings =
            MediaSettings::from_blob(Some(r#"{"convert": true, "legacy_flag": 1}"#));
        assert!(settings.convert);
    }

    #[test]
    fn test_target_format_empty_preference() {
        let mut settings = MediaSettings::default();
        settings.format_preference.clear();
        assert_eq!(settings.target_format(), "cbz");
    }
}
