//! Artifact storage: where export outputs live and how they are named, opened and purged.

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use time::OffsetDateTime;
use time::macros::format_description;

use crate::convert::format::ExportFormat;
use crate::export::store::JobStore;
use crate::foundation::core::{DesignId, JobId};
use crate::foundation::error::{StratumError, StratumResult};

/// Directory tree of export artifacts.
///
/// Layout: `<root>/<design_id>/export-<timestamp>-<hash>.<ext>`, where `hash` is the xxh3 of the
/// design id, job id, timestamp and format. Names are therefore unique per job even when two
/// jobs of the same design finish within the same millisecond.
#[derive(Clone, Debug)]
pub struct ArtifactStorage {
    root: PathBuf,
}

impl ArtifactStorage {
    /// Storage rooted at `root`. Call [`ArtifactStorage::init`] before use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory.
    pub fn init(&self) -> StratumResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            StratumError::storage(format!(
                "failed to create export root '{}': {e}",
                self.root.display()
            ))
        })?;
        tracing::debug!(root = %self.root.display(), "artifact storage ready");
        Ok(())
    }

    /// Storage path for an artifact of `job`.
    pub fn artifact_path(
        &self,
        design: DesignId,
        job: JobId,
        format: ExportFormat,
        at: OffsetDateTime,
    ) -> StratumResult<PathBuf> {
        Ok(self
            .root
            .join(design.to_string())
            .join(format!("{}.{}", artifact_stem(design, job, format, at)?, format.extension())))
    }

    /// Open an artifact for reading.
    ///
    /// Paths outside the root are rejected, including ones that escape it through `..` or a
    /// symlink.
    pub fn open(&self, path: &Path) -> StratumResult<File> {
        self.confine(path)?;
        File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                StratumError::not_found(format!("artifact '{}'", path.display()))
            }
            _ => StratumError::storage(format!("failed to open '{}': {e}", path.display())),
        })
    }

    fn confine(&self, path: &Path) -> StratumResult<()> {
        let outside = || {
            StratumError::storage(format!("'{}' is outside the export root", path.display()))
        };
        if !path.starts_with(&self.root)
            || path.components().any(|c| matches!(c, Component::ParentDir))
        {
            return Err(outside());
        }
        // Missing files are reported by the open itself.
        if let (Ok(real_root), Ok(real_path)) = (self.root.canonicalize(), path.canonicalize())
            && !real_path.starts_with(&real_root)
        {
            return Err(outside());
        }
        Ok(())
    }

    /// Remove an artifact if present.
    pub fn discard(&self, path: &Path) -> StratumResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StratumError::storage(format!(
                "failed to remove '{}': {e}",
                path.display()
            ))),
        }
    }

    /// Delete artifacts of completed jobs whose retention ended at or before `now`.
    ///
    /// The jobs stay `completed` but lose their artifact metadata. Returns the number purged.
    pub fn purge_expired(&self, jobs: &JobStore, now: OffsetDateTime) -> StratumResult<usize> {
        let mut purged = 0;
        for job in jobs.expired(now)? {
            if let Some(meta) = &job.artifact {
                self.discard(&meta.path)?;
            }
            jobs.update(job.id, |j| {
                j.artifact = None;
                Ok(())
            })?;
            purged += 1;
        }
        if purged > 0 {
            tracing::info!(op = "storage::purge", purged, "expired artifacts removed");
        }
        Ok(purged)
    }
}

fn artifact_stem(
    design: DesignId,
    job: JobId,
    format: ExportFormat,
    at: OffsetDateTime,
) -> StratumResult<String> {
    let stamp = at
        .to_offset(time::UtcOffset::UTC)
        .format(format_description!(
            "[year][month][day]T[hour][minute][second][subsecond digits:3]Z"
        ))
        .map_err(|e| StratumError::storage(format!("failed to format timestamp: {e}")))?;

    let mut key = Vec::with_capacity(64);
    key.extend_from_slice(design.0.as_bytes());
    key.extend_from_slice(job.0.as_bytes());
    key.extend_from_slice(stamp.as_bytes());
    key.extend_from_slice(format.extension().as_bytes());
    let hash = xxhash_rust::xxh3::xxh3_64(&key);
    Ok(format!("export-{stamp}-{hash:016x}"))
}

#[cfg(test)]
#[path = "../../tests/unit/storage/storage.rs"]
mod tests;
