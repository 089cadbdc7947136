//! Rename worker
//!
//! Consumes rename job ids from the processing queue and executes them:
//! renders the volume folder and issue filename from the library's
//! templates, moves the file into place, and chains the conversion stage
//! when the settings ask for it. The persisted row is re-fetched on pickup
//! and guarded by status, so a job id dispatched twice is processed once.

use crate::core::error::{LongboxError, Result};
use crate::core::naming;
use crate::core::processing::ProcessingService;
use crate::db::models::{issue_status, JobStatus, ProcessingOrder, RenameJob};
use crate::db::repository::{IssueRepository, RenameJobRepository};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

pub struct RenameWorker {
    processing: Arc<ProcessingService>,
    issue_repo: Arc<IssueRepository>,
    rename_jobs: Arc<RenameJobRepository>,
}

impl RenameWorker {
    pub fn new(
        processing: Arc<ProcessingService>,
        issue_repo: Arc<IssueRepository>,
        rename_jobs: Arc<RenameJobRepository>,
    ) -> Self {
        Self {
            processing,
            issue_repo,
            rename_jobs,
        }
    }

    /// Consumer loop; runs until the queue sender is dropped
    pub async fn run(self: Arc<Self>, mut queue: mpsc::UnboundedReceiver<String>) {
        info!("Rename worker started");
        while let Some(job_id) = queue.recv().await {
            if let Err(e) = self.process_job(&job_id).await {
                error!(job_id = %job_id, error = %e, "Rename job failed");
            }
        }
        info!("Rename worker stopped");
    }

    /// Execute one job by id
    ///
    /// Missing rows and non-processable statuses are silent no-ops; any
    /// failure during the rename itself marks the job failed and is
    /// returned to the caller for logging.
    pub async fn process_job(&self, job_id: &str) -> Result<()> {
        let mut job = match self.rename_jobs.find_by_id(job_id).await? {
            Some(job) => job,
            None => {
                debug!(job_id = %job_id, "Rename job vanished, skipping");
                return Ok(());
            }
        };

        if !JobStatus::from_str(&job.status).is_processable() {
            debug!(job_id = %job_id, status = %job.status, "Rename job not in a processable state");
            return Ok(());
        }

        // Persist the active state before any I/O so a concurrent pickup
        // sees the job as taken
        job.status = JobStatus::Renaming.as_str().to_string();
        job.updated_at = chrono::Utc::now().timestamp();
        self.rename_jobs.update(&job).await?;

        match self.run_rename(&job).await {
            Ok((target_rel, convert_next)) => {
                job.status = JobStatus::Completed.as_str().to_string();
                job.target_file_path = Some(target_rel.clone());
                job.error = None;
                job.updated_at = chrono::Utc::now().timestamp();
                self.rename_jobs.update(&job).await?;

                info!(job_id = %job.id, target = %target_rel, "Rename job completed");

                if convert_next {
                    self.processing
                        .queue_conversion_after_rename(&job.issue_id, &job.volume_id, &target_rel)
                        .await?;
                }
                Ok(())
            }
            Err(e) => {
                job.status = JobStatus::Failed.as_str().to_string();
                job.error = Some(e.to_string());
                job.updated_at = chrono::Utc::now().timestamp();
                self.rename_jobs.update(&job).await?;
                Err(e)
            }
        }
    }

    /// Perform the move; returns the library-relative target path and
    /// whether a conversion stage follows
    async fn run_rename(&self, job: &RenameJob) -> Result<(String, bool)> {
        let (issue, volume, library, settings) =
            self.processing.resolve_issue_context(&job.issue_id).await?;

        let root = Path::new(&library.root_path);
        let source_abs = root.join(&job.source_file_path);
        if !tokio::fs::try_exists(&source_abs).await.unwrap_or(false) {
            return Err(LongboxError::MissingFile(source_abs));
        }

        let extension = source_abs
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();

        let extra = HashMap::new();
        let folder = naming::generate_volume_folder(&settings, &volume, &issue, &extra);
        let filename = naming::generate_issue_filename(&settings, &volume, &issue, &extension, &extra);

        let mut target_rel = join_name(&folder, &filename, None, &extension);
        let mut target_abs = root.join(&target_rel);

        // Disambiguate against existing files, unless the target is the
        // source itself
        let mut suffix = 1;
        while target_abs != source_abs
            && tokio::fs::try_exists(&target_abs).await.unwrap_or(false)
        {
            target_rel = join_name(&folder, &filename, Some(suffix), &extension);
            target_abs = root.join(&target_rel);
            suffix += 1;
        }

        if let Some(parent) = target_abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if source_abs != target_abs {
            tokio::fs::rename(&source_abs, &target_abs).await?;
        }

        let convert_next =
            settings.processing_order == ProcessingOrder::RenameThenConvert && settings.convert;
        let status = if convert_next {
            issue_status::PROCESSED
        } else {
            issue_status::READY
        };
        self.issue_repo
            .update_file(&issue.id, &target_rel, status)
            .await?;

        Ok((target_rel, convert_next))
    }
}

fn join_name(folder: &str, filename: &str, suffix: Option<u32>, extension: &str) -> String {
    let mut name = filename.to_string();
    if let Some(n) = suffix {
        name.push_str(&format!(" ({})", n));
    }
    if !extension.is_empty() {
        name.push('.');
        name.push_str(extension);
    }
    format!("{}/{}", folder, name)
}
