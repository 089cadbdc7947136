//! Post-processing orchestration
//!
//! Decides which pipeline jobs to run for a completed download and in what
//! order, based on the owning library's media settings. Jobs are persisted
//! first and then signalled to the registered consumer over an in-process
//! channel carrying only job ids; the persisted row is always the source of
//! truth, the channel is a wake-up hint. A job enqueued while no consumer
//! is registered stays durable and is picked up by the next recovery scan.

use crate::core::error::{LongboxError, Result};
use crate::db::models::{
    ConversionJob, Issue, JobStatus, Library, MediaSettings, ProcessingOrder, RenameJob, Volume,
};
use crate::db::repository::{
    ConversionJobRepository, IssueRepository, LibraryRepository, RenameJobRepository, Repository,
    VolumeRepository,
};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Orchestrator for rename/conversion job chaining
///
/// All collaborators are constructor-injected; the service holds no
/// process-wide state.
pub struct ProcessingService {
    library_repo: Arc<LibraryRepository>,
    volume_repo: Arc<VolumeRepository>,
    issue_repo: Arc<IssueRepository>,
    rename_jobs: Arc<RenameJobRepository>,
    conversion_jobs: Arc<ConversionJobRepository>,
    rename_tx: RwLock<Option<mpsc::UnboundedSender<String>>>,
    conversion_tx: RwLock<Option<mpsc::UnboundedSender<String>>>,
}

impl ProcessingService {
    pub fn new(
        library_repo: Arc<LibraryRepository>,
        volume_repo: Arc<VolumeRepository>,
        issue_repo: Arc<IssueRepository>,
        rename_jobs: Arc<RenameJobRepository>,
        conversion_jobs: Arc<ConversionJobRepository>,
    ) -> Self {
        Self {
            library_repo,
            volume_repo,
            issue_repo,
            rename_jobs,
            conversion_jobs,
            rename_tx: RwLock::new(None),
            conversion_tx: RwLock::new(None),
        }
    }

    /// Register the rename worker; returns the receiving end of its queue
    pub async fn register_rename_consumer(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.rename_tx.write().await = Some(tx);
        rx
    }

    /// Register the conversion worker; returns the receiving end of its queue
    pub async fn register_conversion_consumer(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.conversion_tx.write().await = Some(tx);
        rx
    }

    /// Resolve the full issue -> volume -> library -> settings chain
    ///
    /// Any missing parent is fatal for the job asking.
    pub async fn resolve_issue_context(
        &self,
        issue_id: &str,
    ) -> Result<(Issue, Volume, Library, MediaSettings)> {
        let issue = self
            .issue_repo
            .find_by_id(issue_id)
            .await?
            .ok_or_else(|| LongboxError::NotFound(format!("issue {}", issue_id)))?;
        let volume = self
            .volume_repo
            .find_by_id(&issue.volume_id)
            .await?
            .ok_or_else(|| LongboxError::NotFound(format!("volume {}", issue.volume_id)))?;
        let library = self
            .library_repo
            .find_by_id(&volume.library_id)
            .await?
            .ok_or_else(|| LongboxError::NotFound(format!("library {}", volume.library_id)))?;
        let settings = MediaSettings::from_blob(library.settings.as_deref());
        Ok((issue, volume, library, settings))
    }

    /// Entry point for a completed download
    ///
    /// Enqueues the first pipeline stage the library settings ask for.
    pub async fn queue_post_processing(
        &self,
        issue_id: &str,
        volume_id: &str,
        file_path: &str,
    ) -> Result<()> {
        let (issue, _volume, _library, settings) = self.resolve_issue_context(issue_id).await?;
        debug_assert_eq!(issue.volume_id, volume_id);

        match settings.processing_order {
            ProcessingOrder::RenameThenConvert => {
                if settings.rename_downloaded_files {
                    self.enqueue_rename(volume_id, issue_id, &issue, file_path)
                        .await
                } else if settings.convert {
                    self.enqueue_conversion(volume_id, issue_id, &issue, file_path, &settings)
                        .await
                } else {
                    debug!(issue_id = %issue_id, "Rename and conversion both disabled, nothing to do");
                    Ok(())
                }
            }
            ProcessingOrder::ConvertThenRename => {
                if settings.convert {
                    self.enqueue_conversion(volume_id, issue_id, &issue, file_path, &settings)
                        .await
                } else if settings.rename_downloaded_files {
                    self.enqueue_rename(volume_id, issue_id, &issue, file_path)
                        .await
                } else {
                    debug!(issue_id = %issue_id, "Rename and conversion both disabled, nothing to do");
                    Ok(())
                }
            }
        }
    }

    /// Continuation invoked by the rename worker after its stage completed
    pub async fn queue_conversion_after_rename(
        &self,
        issue_id: &str,
        volume_id: &str,
        file_path: &str,
    ) -> Result<()> {
        let (issue, _volume, _library, settings) = self.resolve_issue_context(issue_id).await?;
        if !settings.convert {
            debug!(issue_id = %issue_id, "Conversion disabled, pipeline ends at rename");
            return Ok(());
        }
        self.enqueue_conversion(volume_id, issue_id, &issue, file_path, &settings)
            .await
    }

    /// Continuation invoked by the conversion worker after its stage completed
    pub async fn queue_rename_after_conversion(
        &self,
        issue_id: &str,
        volume_id: &str,
        file_path: &str,
    ) -> Result<()> {
        let (issue, _volume, _library, settings) = self.resolve_issue_context(issue_id).await?;
        if !settings.rename_downloaded_files {
            debug!(issue_id = %issue_id, "Rename disabled, pipeline ends at conversion");
            return Ok(());
        }
        self.enqueue_rename(volume_id, issue_id, &issue, file_path)
            .await
    }

    /// Persist a rename job and signal the consumer
    ///
    /// The active-job existence check and the insert are not one atomic
    /// step; with a single enqueuer per process the worst case is a benign
    /// duplicate row, never corruption.
    async fn enqueue_rename(
        &self,
        volume_id: &str,
        issue_id: &str,
        issue: &Issue,
        file_path: &str,
    ) -> Result<()> {
        if self.rename_jobs.has_active_for_issue(issue_id).await? {
            debug!(issue_id = %issue_id, "Active rename job already exists, skipping");
            return Ok(());
        }

        let job = RenameJob {
            id: Uuid::new_v4().to_string(),
            volume_id: volume_id.to_string(),
            issue_id: issue_id.to_string(),
            issue_number: issue.issue_number.clone(),
            source_file_path: file_path.to_string(),
            target_file_path: None,
            status: JobStatus::Queued.as_str().to_string(),
            error: None,
            updated_at: chrono::Utc::now().timestamp(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.rename_jobs.create(&job).await?;

        info!(job_id = %job.id, issue_id = %issue_id, "Rename job queued");
        self.dispatch(&self.rename_tx, &job.id, "rename").await;
        Ok(())
    }

    /// Persist a conversion job and signal the consumer
    async fn enqueue_conversion(
        &self,
        volume_id: &str,
        issue_id: &str,
        issue: &Issue,
        file_path: &str,
        settings: &MediaSettings,
    ) -> Result<()> {
        if self.conversion_jobs.has_active_for_issue(issue_id).await? {
            debug!(issue_id = %issue_id, "Active conversion job already exists, skipping");
            return Ok(());
        }

        let job = ConversionJob {
            id: Uuid::new_v4().to_string(),
            volume_id: volume_id.to_string(),
            issue_id: issue_id.to_string(),
            issue_number: issue.issue_number.clone(),
            source_file_path: file_path.to_string(),
            target_file_path: None,
            target_format: settings.target_format().to_string(),
            status: JobStatus::Queued.as_str().to_string(),
            error: None,
            updated_at: chrono::Utc::now().timestamp(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.conversion_jobs.create(&job).await?;

        info!(job_id = %job.id, issue_id = %issue_id, target_format = %job.target_format, "Conversion job queued");
        self.dispatch(&self.conversion_tx, &job.id, "conversion").await;
        Ok(())
    }

    async fn dispatch(
        &self,
        channel: &RwLock<Option<mpsc::UnboundedSender<String>>>,
        job_id: &str,
        kind: &str,
    ) {
        match channel.read().await.as_ref() {
            Some(tx) => {
                if tx.send(job_id.to_string()).is_err() {
                    warn!(job_id = %job_id, kind = %kind, "Consumer gone, job stays queued for recovery");
                }
            }
            None => {
                debug!(job_id = %job_id, kind = %kind, "No consumer registered, job stays queued");
            }
        }
    }

    /// Re-dispatch persisted queued/retry jobs after a cold start
    ///
    /// Retry rows are reset to queued first so the worker's pickup guard
    /// accepts them. Returns how many jobs were put back on the queues.
    pub async fn recover_jobs(&self) -> Result<usize> {
        let mut recovered = 0;

        for mut job in self.rename_jobs.find_processable().await? {
            if job.status == JobStatus::Retry.as_str() {
                job.status = JobStatus::Queued.as_str().to_string();
                job.updated_at = chrono::Utc::now().timestamp();
                self.rename_jobs.update(&job).await?;
            }
            self.dispatch(&self.rename_tx, &job.id, "rename").await;
            recovered += 1;
        }

        for mut job in self.conversion_jobs.find_processable().await? {
            if job.status == JobStatus::Retry.as_str() {
                job.status = JobStatus::Queued.as_str().to_string();
                job.updated_at = chrono::Utc::now().timestamp();
                self.conversion_jobs.update(&job).await?;
            }
            self.dispatch(&self.conversion_tx, &job.id, "conversion").await;
            recovered += 1;
        }

        if recovered > 0 {
            info!(recovered = recovered, "Recovered persisted jobs");
        }
        Ok(recovered)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{harness, seed};
    use super::*;

    #[tokio::test]
    async fn test_rename_first_enqueues_rename_only() {
        let h = harness().await;
        let mut settings = MediaSettings::default();
        settings.convert = true;
        let (_lib, vol, iss) = seed(&h, "/comics", Some(&settings)).await;

        h.service
            .queue_post_processing(&iss, &vol, "downloads/twd_3.cbz")
            .await
            .unwrap();

        assert_eq!(h.rename_jobs.count_for_issue(&iss).await.unwrap(), 1);
        assert_eq!(h.conversion_jobs.count_for_issue(&iss).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_convert_first_enqueues_conversion_only() {
        let h = harness().await;
        let mut settings = MediaSettings::default();
        settings.convert = true;
        settings.processing_order = ProcessingOrder::ConvertThenRename;
        let (_lib, vol, iss) = seed(&h, "/comics", Some(&settings)).await;

        h.service
            .queue_post_processing(&iss, &vol, "downloads/twd_3.zip")
            .await
            .unwrap();

        assert_eq!(h.rename_jobs.count_for_issue(&iss).await.unwrap(), 0);
        assert_eq!(h.conversion_jobs.count_for_issue(&iss).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rename_disabled_falls_through_to_conversion() {
        let h = harness().await;
        let mut settings = MediaSettings::default();
        settings.rename_downloaded_files = false;
        settings.convert = true;
        let (_lib, vol, iss) = seed(&h, "/comics", Some(&settings)).await;

        h.service
            .queue_post_processing(&iss, &vol, "downloads/twd_3.zip")
            .await
            .unwrap();

        assert_eq!(h.rename_jobs.count_for_issue(&iss).await.unwrap(), 0);
        assert_eq!(h.conversion_jobs.count_for_issue(&iss).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_both_disabled_produces_no_jobs() {
        let h = harness().await;
        let mut settings = MediaSettings::default();
        settings.rename_downloaded_files = false;
        settings.convert = false;
        let (_lib, vol, iss) = seed(&h, "/comics", Some(&settings)).await;

        h.service
            .queue_post_processing(&iss, &vol, "downloads/twd_3.cbz")
            .await
            .unwrap();

        assert_eq!(h.rename_jobs.count_for_issue(&iss).await.unwrap(), 0);
        assert_eq!(h.conversion_jobs.count_for_issue(&iss).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_noop() {
        let h = harness().await;
        let (_lib, vol, iss) = seed(&h, "/comics", None).await;

        h.service
            .queue_post_processing(&iss, &vol, "downloads/twd_3.cbz")
            .await
            .unwrap();
        h.service
            .queue_post_processing(&iss, &vol, "downloads/twd_3.cbz")
            .await
            .unwrap();

        assert_eq!(h.rename_jobs.count_for_issue(&iss).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_registered_consumer_receives_job_id() {
        let h = harness().await;
        let (_lib, vol, iss) = seed(&h, "/comics", None).await;

        let mut rx = h.service.register_rename_consumer().await;
        h.service
            .queue_post_processing(&iss, &vol, "downloads/twd_3.cbz")
            .await
            .unwrap();

        let job_id = rx.recv().await.unwrap();
        let job = h.rename_jobs.find_by_id(&job_id).await.unwrap().unwrap();
        assert_eq!(job.issue_id, iss);
        assert_eq!(job.status, "queued");
    }

    #[tokio::test]
    async fn test_enqueue_without_consumer_stays_durable() {
        let h = harness().await;
        let (_lib, vol, iss) = seed(&h, "/comics", None).await;

        h.service
            .queue_post_processing(&iss, &vol, "downloads/twd_3.cbz")
            .await
            .unwrap();

        let processable = h.rename_jobs.find_processable().await.unwrap();
        assert_eq!(processable.len(), 1);
    }

    #[tokio::test]
    async fn test_recover_jobs_redispatches_and_resets_retry() {
        let h = harness().await;
        let (_lib, vol, iss) = seed(&h, "/comics", None).await;

        // A job persisted before any consumer existed
        h.service
            .queue_post_processing(&iss, &vol, "downloads/twd_3.cbz")
            .await
            .unwrap();

        // Flip it to retry to exercise the reset path
        let mut job = h.rename_jobs.find_processable().await.unwrap().remove(0);
        job.status = JobStatus::Retry.as_str().to_string();
        h.rename_jobs.update(&job).await.unwrap();

        let mut rx = h.service.register_rename_consumer().await;
        let recovered = h.service.recover_jobs().await.unwrap();
        assert_eq!(recovered, 1);

        let job_id = rx.recv().await.unwrap();
        let job = h.rename_jobs.find_by_id(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, "queued");
    }

    #[tokio::test]
    async fn test_missing_issue_is_fatal() {
        let h = harness().await;
        let err = h
            .service
            .queue_post_processing("ghost", "vol-1", "downloads/x.cbz")
            .await
            .unwrap_err();
        assert!(matches!(err, LongboxError::NotFound(_)));
    }
}
