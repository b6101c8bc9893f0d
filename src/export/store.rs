use std::collections::HashMap;
use std::sync::Mutex;

use time::OffsetDateTime;

use crate::export::job::{ExportJob, JobStatus};
use crate::foundation::core::{DesignId, JobId};
use crate::foundation::error::{StratumError, StratumResult};

/// In-process job registry.
///
/// All mutations go through one mutex, which makes [`JobStore::claim`] the single atomic
/// `queued -> processing` transition: at most one worker ever processes a given job.
///
/// Records are kept until [`JobStore::evict`] drops them; the artifact retention sweep only
/// clears artifact metadata.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, ExportJob>>,
}

impl JobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a new job.
    pub fn insert(&self, job: ExportJob) -> StratumResult<JobId> {
        let id = job.id;
        let mut jobs = self.jobs.lock().map_err(|_| poisoned())?;
        if jobs.contains_key(&id) {
            return Err(StratumError::invalid_state(format!("job {id} already exists")));
        }
        jobs.insert(id, job);
        Ok(id)
    }

    /// Copy of a job.
    pub fn get(&self, id: JobId) -> StratumResult<ExportJob> {
        self.jobs
            .lock()
            .map_err(|_| poisoned())?
            .get(&id)
            .cloned()
            .ok_or_else(|| StratumError::not_found(format!("job {id}")))
    }

    /// Claim a queued job for processing.
    ///
    /// Returns `None` when the job is no longer `queued` (already claimed, cancelled, ...).
    pub fn claim(&self, id: JobId, now: OffsetDateTime) -> StratumResult<Option<ExportJob>> {
        let mut jobs = self.jobs.lock().map_err(|_| poisoned())?;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StratumError::not_found(format!("job {id}")))?;
        if job.status != JobStatus::Queued {
            return Ok(None);
        }
        job.transition(JobStatus::Processing, now)?;
        Ok(Some(job.clone()))
    }

    /// Apply `f` to a job; the change is committed only when `f` succeeds.
    pub fn update<R>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut ExportJob) -> StratumResult<R>,
    ) -> StratumResult<R> {
        let mut jobs = self.jobs.lock().map_err(|_| poisoned())?;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StratumError::not_found(format!("job {id}")))?;
        let mut draft = job.clone();
        let out = f(&mut draft)?;
        *job = draft;
        Ok(out)
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> StratumResult<Vec<ExportJob>> {
        let mut out: Vec<ExportJob> = self
            .jobs
            .lock()
            .map_err(|_| poisoned())?
            .values()
            .cloned()
            .collect();
        out.sort_by_key(|j| (j.created_at, j.id));
        Ok(out)
    }

    /// Jobs of one design, oldest first.
    pub fn for_design(&self, design: DesignId) -> StratumResult<Vec<ExportJob>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|j| j.design_id == design)
            .collect())
    }

    /// Completed jobs whose artifact expired at or before `now`.
    pub fn expired(&self, now: OffsetDateTime) -> StratumResult<Vec<ExportJob>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|j| {
                j.status == JobStatus::Completed
                    && j.artifact.is_some()
                    && j.expires_at.is_some_and(|t| t <= now)
            })
            .collect())
    }

    /// Drop terminal jobs last updated at or before `cutoff` that hold no artifact.
    ///
    /// Completed jobs stay until their artifact has been purged. Returns the number removed.
    pub fn evict(&self, cutoff: OffsetDateTime) -> StratumResult<usize> {
        let mut jobs = self.jobs.lock().map_err(|_| poisoned())?;
        let before = jobs.len();
        jobs.retain(|_, j| {
            !(j.status.is_terminal() && j.artifact.is_none() && j.updated_at <= cutoff)
        });
        Ok(before - jobs.len())
    }

    /// Number of stored jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().map(|j| j.len()).unwrap_or(0)
    }

    /// Return `true` when no job is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StratumError {
    StratumError::Other(anyhow::anyhow!("job store lock poisoned"))
}

#[cfg(test)]
#[path = "../../tests/unit/export/store.rs"]
mod tests;
