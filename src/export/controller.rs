use std::any::Any;
use std::fs::File;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::convert::format::{ConvertRequest, Converter, ExportFormat, QualityTier};
use crate::design::store::DesignRepository;
use crate::export::job::{
    ArtifactMeta, ExportJob, ExportRequest, JobError, JobStatus, JobStatusView,
};
use crate::export::queue::JobQueue;
use crate::export::store::JobStore;
use crate::foundation::core::JobId;
use crate::foundation::error::{StratumError, StratumResult};
use crate::render::renderer::{RenderOptions, render_with};
use crate::storage::ArtifactStorage;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Tunables of the export pipeline.
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    /// How long completed artifacts are kept.
    pub retention: time::Duration,
    /// Quality used when a request names none.
    pub default_quality: QualityTier,
    /// Directory relative image sources resolve against.
    pub asset_root: Option<PathBuf>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            retention: time::Duration::hours(24),
            default_quality: QualityTier::default(),
            asset_root: None,
        }
    }
}

/// Export job controller: validates submissions, drives jobs through their lifecycle and hands
/// out artifacts.
pub struct ExportController {
    designs: Arc<dyn DesignRepository>,
    jobs: Arc<JobStore>,
    queue: Arc<dyn JobQueue>,
    converter: Arc<dyn Converter>,
    storage: ArtifactStorage,
    settings: ControllerSettings,
}

impl std::fmt::Debug for ExportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportController")
            .field("converter", &self.converter.name())
            .field("storage", &self.storage)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ExportController {
    /// Wire a controller from its collaborators.
    pub fn new(
        designs: Arc<dyn DesignRepository>,
        jobs: Arc<JobStore>,
        queue: Arc<dyn JobQueue>,
        converter: Arc<dyn Converter>,
        storage: ArtifactStorage,
    ) -> Self {
        Self {
            designs,
            jobs,
            queue,
            converter,
            storage,
            settings: ControllerSettings::default(),
        }
    }

    /// Replace the pipeline settings.
    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Queue feeding the workers.
    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Job registry.
    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    /// Artifact storage.
    pub fn storage(&self) -> &ArtifactStorage {
        &self.storage
    }

    /// Validate and enqueue an export.
    ///
    /// Format, option and design checks happen here; a rejected request creates no job.
    #[tracing::instrument(
        name = "export::submit",
        skip_all,
        fields(design = %request.design_id, format = %request.format)
    )]
    pub fn submit(&self, request: ExportRequest) -> StratumResult<JobId> {
        let format = ExportFormat::parse(&request.format)?;
        let options = request.options(self.settings.default_quality);
        options.validate()?;
        if let Some(animation) = &request.animation {
            animation.validate()?;
        }
        if !self.designs.exists(request.design_id) {
            return Err(StratumError::not_found(format!(
                "design {}",
                request.design_id
            )));
        }

        let job = ExportJob::new(
            request.design_id,
            request.requester,
            format,
            options,
            request.animation,
            now(),
        );
        let id = self.jobs.insert(job)?;
        self.enqueue(id)?;
        info!(op = "export::submit", job = %id, result = "queued", "export job queued");
        Ok(id)
    }

    /// Process one job: claim, render, convert, finalize.
    ///
    /// Returns the job's status afterwards. A job that is not `queued` is left alone. Errors
    /// and panics during rendering or conversion are recorded on the job, never returned.
    #[tracing::instrument(name = "export::process", skip(self), fields(job = %id))]
    pub fn process(&self, id: JobId) -> StratumResult<JobStatus> {
        let Some(job) = self.jobs.claim(id, now())? else {
            let status = self.jobs.get(id)?.status;
            debug!(op = "export::process", result = "skipped", %status, "job not claimable");
            return Ok(status);
        };

        let started_at = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.run(&job)))
            .unwrap_or_else(|panic| {
                Err(StratumError::Other(anyhow::anyhow!(
                    "export panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        match outcome {
            Ok(meta) => {
                let size_bytes = meta.size_bytes;
                let retention = self.settings.retention;
                self.jobs.update(id, |j| {
                    let at = now();
                    j.transition(JobStatus::Completed, at)?;
                    j.artifact = Some(meta);
                    j.expires_at = Some(at + retention);
                    Ok(())
                })?;
                info!(
                    op = "export::process",
                    job = %id,
                    result = "completed",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    size_bytes,
                    "export job completed"
                );
                Ok(JobStatus::Completed)
            }
            Err(err) => {
                let record = JobError::from(&err);
                warn!(
                    op = "export::process",
                    job = %id,
                    result = "failed",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    code = %record.code,
                    error = %err,
                    details = record.details.as_deref().unwrap_or(""),
                    "export job failed"
                );
                self.jobs.update(id, |j| {
                    j.transition(JobStatus::Failed, now())?;
                    j.error = Some(record);
                    Ok(())
                })?;
                Ok(JobStatus::Failed)
            }
        }
    }

    fn run(&self, job: &ExportJob) -> StratumResult<ArtifactMeta> {
        let design = self.designs.snapshot(job.design_id)?;
        let doc = render_with(
            &design,
            &RenderOptions {
                animation: job.animation,
                asset_root: self.settings.asset_root.clone(),
            },
        )?;
        self.jobs.update(job.id, |j| {
            j.progress = 50;
            Ok(())
        })?;

        let output_path =
            self.storage
                .artifact_path(job.design_id, job.id, job.format, now())?;
        let request = ConvertRequest {
            format: job.format,
            options: job.options.clone(),
            output_path,
        };
        match self.converter.convert(&doc, &request) {
            Ok(handle) => Ok(ArtifactMeta::from_handle(handle, job.format)),
            Err(err) => {
                if let Err(cleanup) = self.storage.discard(&request.output_path) {
                    warn!(job = %job.id, error = %cleanup, "failed to remove partial artifact");
                }
                Err(err)
            }
        }
    }

    /// Cancel a job that has not started processing.
    pub fn cancel(&self, id: JobId) -> StratumResult<JobStatusView> {
        let view = self.jobs.update(id, |j| {
            if !matches!(j.status, JobStatus::Created | JobStatus::Queued) {
                return Err(StratumError::invalid_state(format!(
                    "job {id} is {}; only created or queued jobs can be cancelled",
                    j.status
                )));
            }
            j.transition(JobStatus::Cancelled, now())?;
            Ok(j.view())
        })?;
        info!(op = "export::cancel", job = %id, result = "cancelled", "export job cancelled");
        Ok(view)
    }

    /// Retry a failed job as a new job; the failed one is left untouched.
    pub fn retry(&self, id: JobId) -> StratumResult<JobId> {
        let failed = self.jobs.get(id)?;
        if failed.status != JobStatus::Failed {
            return Err(StratumError::invalid_state(format!(
                "job {id} is {}; only failed jobs can be retried",
                failed.status
            )));
        }
        let job = failed.retry_from(now());
        let attempt = job.attempt;
        let new_id = self.jobs.insert(job)?;
        self.enqueue(new_id)?;
        info!(
            op = "export::retry",
            job = %new_id,
            retry_of = %id,
            attempt,
            result = "queued",
            "export job retried"
        );
        Ok(new_id)
    }

    /// Public status of a job.
    pub fn status(&self, id: JobId) -> StratumResult<JobStatusView> {
        Ok(self.jobs.get(id)?.view())
    }

    /// Full job record, including internal diagnostics.
    pub fn job(&self, id: JobId) -> StratumResult<ExportJob> {
        self.jobs.get(id)
    }

    /// Artifact of a completed job, opened for reading.
    pub fn artifact(&self, id: JobId) -> StratumResult<(ArtifactMeta, File)> {
        let job = self.jobs.get(id)?;
        if job.status != JobStatus::Completed {
            return Err(StratumError::invalid_state(format!(
                "job {id} is {}; artifacts are only available once completed",
                job.status
            )));
        }
        let meta = job
            .artifact
            .ok_or_else(|| StratumError::not_found(format!("artifact of job {id} was purged")))?;
        let file = self.storage.open(&meta.path)?;
        Ok((meta, file))
    }

    /// Block until the job reaches a terminal state or `timeout` elapses.
    pub fn wait(&self, id: JobId, timeout: Duration) -> StratumResult<JobStatusView> {
        let deadline = Instant::now() + timeout;
        loop {
            let view = self.status(id)?;
            if view.status.is_terminal() {
                return Ok(view);
            }
            if Instant::now() >= deadline {
                return Err(StratumError::timeout(format!(
                    "job {id} still {} after {timeout:?}",
                    view.status
                )));
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Purge artifacts whose retention ended at or before `now`.
    pub fn purge_expired(&self, now: OffsetDateTime) -> StratumResult<usize> {
        self.storage.purge_expired(&self.jobs, now)
    }

    /// Forget finished jobs last updated at or before `cutoff`.
    ///
    /// Completed jobs are only forgotten once [`ExportController::purge_expired`] has removed
    /// their artifact.
    pub fn evict_finished(&self, cutoff: OffsetDateTime) -> StratumResult<usize> {
        let evicted = self.jobs.evict(cutoff)?;
        if evicted > 0 {
            info!(op = "export::evict", evicted, "finished job records dropped");
        }
        Ok(evicted)
    }

    fn enqueue(&self, id: JobId) -> StratumResult<()> {
        self.jobs
            .update(id, |j| j.transition(JobStatus::Queued, now()))?;
        if let Err(err) = self.queue.push(id) {
            let record = JobError::from(&err);
            self.jobs.update(id, |j| {
                j.transition(JobStatus::Failed, now())?;
                j.error = Some(record);
                Ok(())
            })?;
            return Err(err);
        }
        Ok(())
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/controller.rs"]
mod tests;
