use std::fmt;
use std::path::PathBuf;

use time::OffsetDateTime;

use crate::convert::format::{ArtifactHandle, ConvertOptions, ExportFormat, QualityTier};
use crate::design::model::AnimationSettings;
use crate::foundation::core::{DesignId, JobId};
use crate::foundation::error::{StratumError, StratumResult};

/// Lifecycle state of an export job.
///
/// `created -> queued -> processing -> {completed | failed}`, with `cancelled` reachable from
/// `created` and `queued`. Terminal states never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Persisted, not yet queued.
    Created,
    /// Waiting for a worker.
    Queued,
    /// Claimed by a worker.
    Processing,
    /// Artifact available.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before processing started.
    Cancelled,
}

impl JobStatus {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a permitted transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Created, Queued)
                | (Created, Cancelled)
                | (Created, Failed)
                | (Queued, Processing)
                | (Queued, Cancelled)
                | (Queued, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Progress percentage reported for this state.
    pub fn progress(self) -> u8 {
        match self {
            Self::Created | Self::Queued | Self::Cancelled => 0,
            Self::Processing => 10,
            Self::Completed | Self::Failed => 100,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Export submission.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    /// Design to export.
    pub design_id: DesignId,
    /// Opaque requester identity, recorded on the job.
    #[serde(default)]
    pub requester: String,
    /// Format name, validated on submit.
    pub format: String,
    /// Quality preset; the configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityTier>,
    /// Target width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Target height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Uniform scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Keep transparency where supported.
    #[serde(default)]
    pub transparent: bool,
    /// Background color override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    /// Replaces the design's animation settings for animated formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<AnimationSettings>,
}

impl ExportRequest {
    /// Request `format` for `design_id` with default options.
    pub fn new(design_id: DesignId, format: impl Into<String>) -> Self {
        Self {
            design_id,
            format: format.into(),
            ..Self::default()
        }
    }

    /// Converter options derived from this request.
    pub fn options(&self, default_quality: QualityTier) -> ConvertOptions {
        ConvertOptions {
            quality: self.quality.unwrap_or(default_quality),
            width: self.width,
            height: self.height,
            scale: self.scale,
            transparent: self.transparent,
            background_color: self.background_color.clone(),
        }
    }
}

/// Failure recorded on a job.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Raw diagnostics (subprocess output); internal only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&StratumError> for JobError {
    fn from(err: &StratumError) -> Self {
        let message = match err {
            StratumError::Conversion { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            code: err.code().to_string(),
            message,
            details: err.diagnostics().map(str::to_string),
        }
    }
}

/// Public part of a [`JobError`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PublicError {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Metadata of a completed job's artifact.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMeta {
    /// Location in artifact storage.
    pub path: PathBuf,
    /// Final path component of `path`.
    pub file_name: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// MIME type.
    pub mime_type: String,
    /// Delivery format.
    pub format: ExportFormat,
}

impl ArtifactMeta {
    /// Build metadata from a converter handle.
    pub fn from_handle(handle: ArtifactHandle, format: ExportFormat) -> Self {
        let file_name = handle
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: handle.path,
            file_name,
            size_bytes: handle.size_bytes,
            mime_type: handle.mime_type,
            format,
        }
    }
}

/// One export attempt.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    /// Job identity.
    pub id: JobId,
    /// Exported design.
    pub design_id: DesignId,
    /// Requester identity.
    pub requester: String,
    /// Target format.
    pub format: ExportFormat,
    /// Converter options.
    pub options: ConvertOptions,
    /// Animation override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<AnimationSettings>,
    /// Current state.
    pub status: JobStatus,
    /// Progress percentage.
    pub progress: u8,
    /// 1 for the first attempt, incremented by each retry.
    pub attempt: u32,
    /// Job this one retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<JobId>,
    /// Artifact metadata once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactMeta>,
    /// Failure once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last state change.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// When processing started.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// When the job reached `completed` or `failed`.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// When the artifact may be purged.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl ExportJob {
    /// New job in `created`.
    pub fn new(
        design_id: DesignId,
        requester: impl Into<String>,
        format: ExportFormat,
        options: ConvertOptions,
        animation: Option<AnimationSettings>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: JobId::new(),
            design_id,
            requester: requester.into(),
            format,
            options,
            animation,
            status: JobStatus::Created,
            progress: 0,
            attempt: 1,
            retry_of: None,
            artifact: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            expires_at: None,
        }
    }

    /// Fresh `created` job repeating this one's request.
    pub fn retry_from(&self, now: OffsetDateTime) -> Self {
        let mut job = Self::new(
            self.design_id,
            self.requester.clone(),
            self.format,
            self.options.clone(),
            self.animation,
            now,
        );
        job.retry_of = Some(self.id);
        job.attempt = self.attempt + 1;
        job
    }

    /// Move to `next`, stamping timestamps and progress.
    pub fn transition(&mut self, next: JobStatus, now: OffsetDateTime) -> StratumResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(StratumError::invalid_state(format!(
                "job {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.progress = next.progress();
        self.updated_at = now;
        match next {
            JobStatus::Processing => self.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed => self.completed_at = Some(now),
            _ => {}
        }
        Ok(())
    }

    /// Public status view.
    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            id: self.id,
            status: self.status,
            progress: self.progress,
            artifact: self.artifact.clone(),
            error: self.error.as_ref().map(|e| PublicError {
                code: e.code.clone(),
                message: e.message.clone(),
            }),
            attempt: self.attempt,
            retry_of: self.retry_of,
        }
    }
}

/// Status exposed to callers; never carries raw diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    /// Job identity.
    pub id: JobId,
    /// Current state.
    pub status: JobStatus,
    /// Progress percentage.
    pub progress: u8,
    /// Artifact metadata once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactMeta>,
    /// Error code and message once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PublicError>,
    /// Attempt number.
    pub attempt: u32,
    /// Job this one retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<JobId>,
}

#[cfg(test)]
#[path = "../../tests/unit/export/job.rs"]
mod tests;
