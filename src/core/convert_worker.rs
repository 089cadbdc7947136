//! Conversion worker
//!
//! Consumes conversion job ids and converts issue files toward the
//! library's preferred format. A source that already carries the target
//! extension short-circuits to completed without touching the filesystem.
//! The only implemented transform is the zip <-> cbz rename (the same
//! container format under two names); every other pair fails the job with
//! an unsupported-conversion error rather than pretending to complete.

use crate::core::error::{LongboxError, Result};
use crate::core::processing::ProcessingService;
use crate::db::models::{issue_status, ConversionJob, JobStatus, ProcessingOrder};
use crate::db::repository::{ConversionJobRepository, IssueRepository};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

pub struct ConvertWorker {
    processing: Arc<ProcessingService>,
    issue_repo: Arc<IssueRepository>,
    conversion_jobs: Arc<ConversionJobRepository>,
}

impl ConvertWorker {
    pub fn new(
        processing: Arc<ProcessingService>,
        issue_repo: Arc<IssueRepository>,
        conversion_jobs: Arc<ConversionJobRepository>,
    ) -> Self {
        Self {
            processing,
            issue_repo,
            conversion_jobs,
        }
    }

    /// Consumer loop; runs until the queue sender is dropped
    pub async fn run(self: Arc<Self>, mut queue: mpsc::UnboundedReceiver<String>) {
        info!("Conversion worker started");
        while let Some(job_id) = queue.recv().await {
            if let Err(e) = self.process_job(&job_id).await {
                error!(job_id = %job_id, error = %e, "Conversion job failed");
            }
        }
        info!("Conversion worker stopped");
    }

    /// Execute one job by id
    pub async fn process_job(&self, job_id: &str) -> Result<()> {
        let mut job = match self.conversion_jobs.find_by_id(job_id).await? {
            Some(job) => job,
            None => {
                debug!(job_id = %job_id, "Conversion job vanished, skipping");
                return Ok(());
            }
        };

        if !JobStatus::from_str(&job.status).is_processable() {
            debug!(job_id = %job_id, status = %job.status, "Conversion job not in a processable state");
            return Ok(());
        }

        job.status = JobStatus::Converting.as_str().to_string();
        job.updated_at = chrono::Utc::now().timestamp();
        self.conversion_jobs.update(&job).await?;

        match self.run_conversion(&job).await {
            Ok((target_rel, rename_next)) => {
                job.status = JobStatus::Completed.as_str().to_string();
                job.target_file_path = Some(target_rel.clone());
                job.error = None;
                job.updated_at = chrono::Utc::now().timestamp();
                self.conversion_jobs.update(&job).await?;

                info!(job_id = %job.id, target = %target_rel, "Conversion job completed");

                if rename_next {
                    self.processing
                        .queue_rename_after_conversion(&job.issue_id, &job.volume_id, &target_rel)
                        .await?;
                }
                Ok(())
            }
            Err(e) => {
                job.status = JobStatus::Failed.as_str().to_string();
                job.error = Some(e.to_string());
                job.updated_at = chrono::Utc::now().timestamp();
                self.conversion_jobs.update(&job).await?;
                Err(e)
            }
        }
    }

    /// Perform the conversion; returns the library-relative target path
    /// and whether a rename stage follows
    async fn run_conversion(&self, job: &ConversionJob) -> Result<(String, bool)> {
        let (issue, _volume, library, settings) =
            self.processing.resolve_issue_context(&job.issue_id).await?;

        let root = Path::new(&library.root_path);
        let source_abs = root.join(&job.source_file_path);
        if !tokio::fs::try_exists(&source_abs).await.unwrap_or(false) {
            return Err(LongboxError::MissingFile(source_abs));
        }

        let source_format = source_abs
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let target_format = job.target_format.to_lowercase();

        let rename_next = settings.processing_order == ProcessingOrder::ConvertThenRename
            && settings.rename_downloaded_files;
        let status = if rename_next {
            issue_status::PROCESSED
        } else {
            issue_status::READY
        };

        // Already in the target format: nothing to move
        if source_format == target_format {
            debug!(job_id = %job.id, format = %target_format, "Source already in target format");
            self.issue_repo
                .update_file(&issue.id, &job.source_file_path, status)
                .await?;
            return Ok((job.source_file_path.clone(), rename_next));
        }

        // zip and cbz are the same container; everything else has no
        // implemented transform
        let is_rename_equivalent = matches!(
            (source_format.as_str(), target_format.as_str()),
            ("zip", "cbz") | ("cbz", "zip")
        );
        if !is_rename_equivalent {
            return Err(LongboxError::UnsupportedConversion {
                source_format,
                target_format,
            });
        }

        let target_abs = source_abs.with_extension(&target_format);
        let target_rel = Path::new(&job.source_file_path)
            .with_extension(&target_format)
            .to_string_lossy()
            .into_owned();

        tokio::fs::rename(&source_abs, &target_abs).await?;
        self.issue_repo
            .update_file(&issue.id, &target_rel, status)
            .await?;

        Ok((target_rel, rename_next))
    }
}
