//! Runtime configuration with layered precedence: TOML file, then `STRATUM_*` environment
//! variables, then command-line overrides.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::level_filters::LevelFilter;

use crate::convert::external::{DEFAULT_RASTERIZER, DEFAULT_TRANSCODER, ExternalConverter};
use crate::convert::format::{Converter, QualityTier};
use crate::convert::raster::RasterConverter;
use crate::design::store::DesignRepository;
use crate::export::controller::{ControllerSettings, ExportController};
use crate::export::queue::InProcessQueue;
use crate::export::store::JobStore;
use crate::foundation::error::{StratumError, StratumResult};
use crate::storage::ArtifactStorage;

const ENV_PREFIX: &str = "STRATUM_";
const DEFAULT_EXPORT_ROOT: &str = "exports";
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_CONVERSION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RETENTION_HOURS: u64 = 24;
const MAX_WORKERS: usize = 64;
const MAX_RETENTION_HOURS: u64 = 24 * 365;

/// Settings for the export pipeline and the binary around it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StratumConfig {
    /// Root directory of export artifacts.
    pub export_root: PathBuf,
    /// Number of export worker threads.
    pub workers: usize,
    /// Upper bound on a single external conversion step.
    pub conversion_timeout_secs: u64,
    /// How long completed artifacts are kept.
    pub retention_hours: u64,
    /// Rasterizer program (ImageMagick-compatible command line).
    pub rasterizer: PathBuf,
    /// Transcoder program (ffmpeg-compatible command line).
    pub transcoder: PathBuf,
    /// Quality used when a request names none.
    pub default_quality: QualityTier,
    /// Base log level (`trace`, `debug`, `info`, `warn`, `error`, `off`).
    pub log_level: String,
}

impl Default for StratumConfig {
    fn default() -> Self {
        Self {
            export_root: PathBuf::from(DEFAULT_EXPORT_ROOT),
            workers: DEFAULT_WORKERS,
            conversion_timeout_secs: DEFAULT_CONVERSION_TIMEOUT_SECS,
            retention_hours: DEFAULT_RETENTION_HOURS,
            rasterizer: PathBuf::from(DEFAULT_RASTERIZER),
            transcoder: PathBuf::from(DEFAULT_TRANSCODER),
            default_quality: QualityTier::default(),
            log_level: "info".to_string(),
        }
    }
}

/// Command-line overrides; `None` keeps the configured value.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Override `export_root`.
    pub export_root: Option<PathBuf>,
    /// Override `workers`.
    pub workers: Option<usize>,
    /// Override `conversion_timeout_secs`.
    pub conversion_timeout_secs: Option<u64>,
    /// Override `rasterizer`.
    pub rasterizer: Option<PathBuf>,
    /// Override `transcoder`.
    pub transcoder: Option<PathBuf>,
    /// Override `default_quality`.
    pub default_quality: Option<QualityTier>,
    /// Override `log_level`.
    pub log_level: Option<String>,
}

impl StratumConfig {
    /// Load from an optional TOML file and the process environment, then validate.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config
            .apply_env(std::env::vars())
            .context("apply STRATUM_* environment overrides")?;
        config.validate().context("validate configuration")?;
        Ok(config)
    }

    /// Parse a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parse config '{}'", path.display()))
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> StratumResult<Self> {
        toml::from_str(text).map_err(|e| StratumError::validation(format!("invalid config: {e}")))
    }

    /// Apply `STRATUM_<KEY>` overrides from `vars`. Unrelated variables are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> StratumResult<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "export_root" => self.export_root = PathBuf::from(value),
                "workers" => self.workers = parse_env(&key, value)?,
                "conversion_timeout_secs" => self.conversion_timeout_secs = parse_env(&key, value)?,
                "retention_hours" => self.retention_hours = parse_env(&key, value)?,
                "rasterizer" => self.rasterizer = PathBuf::from(value),
                "transcoder" => self.transcoder = PathBuf::from(value),
                "default_quality" => self.default_quality = QualityTier::parse(value)?,
                "log_level" => self.log_level = value.to_string(),
                _ => {}
            }
        }
        Ok(())
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = &overrides.export_root {
            self.export_root = v.clone();
        }
        if let Some(v) = overrides.workers {
            self.workers = v;
        }
        if let Some(v) = overrides.conversion_timeout_secs {
            self.conversion_timeout_secs = v;
        }
        if let Some(v) = &overrides.rasterizer {
            self.rasterizer = v.clone();
        }
        if let Some(v) = &overrides.transcoder {
            self.transcoder = v.clone();
        }
        if let Some(v) = overrides.default_quality {
            self.default_quality = v;
        }
        if let Some(v) = &overrides.log_level {
            self.log_level = v.clone();
        }
    }

    /// Check ranges and names.
    pub fn validate(&self) -> StratumResult<()> {
        if self.export_root.as_os_str().is_empty() {
            return Err(invalid("export_root", "must not be empty"));
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(invalid("workers", format!("must be within 1..={MAX_WORKERS}")));
        }
        if self.conversion_timeout_secs == 0 {
            return Err(invalid("conversion_timeout_secs", "must be positive"));
        }
        if !(1..=MAX_RETENTION_HOURS).contains(&self.retention_hours) {
            return Err(invalid(
                "retention_hours",
                format!("must be within 1..={MAX_RETENTION_HOURS}"),
            ));
        }
        if self.rasterizer.as_os_str().is_empty() {
            return Err(invalid("rasterizer", "must not be empty"));
        }
        if self.transcoder.as_os_str().is_empty() {
            return Err(invalid("transcoder", "must not be empty"));
        }
        self.level_filter()?;
        Ok(())
    }

    /// Parsed `log_level`.
    pub fn level_filter(&self) -> StratumResult<LevelFilter> {
        self.log_level
            .trim()
            .parse::<LevelFilter>()
            .map_err(|_| invalid("log_level", format!("unknown level '{}'", self.log_level)))
    }

    /// Conversion timeout as a [`Duration`].
    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_secs(self.conversion_timeout_secs)
    }

    /// Controller settings derived from this config.
    pub fn controller_settings(&self, asset_root: Option<PathBuf>) -> ControllerSettings {
        ControllerSettings {
            retention: time::Duration::hours(
                i64::try_from(self.retention_hours).unwrap_or(MAX_RETENTION_HOURS as i64),
            ),
            default_quality: self.default_quality,
            asset_root,
        }
    }

    /// Subprocess converter using the configured programs and timeout.
    pub fn external_converter(&self) -> ExternalConverter {
        ExternalConverter::new(
            self.rasterizer.clone(),
            self.transcoder.clone(),
            self.conversion_timeout(),
        )
    }

    /// Wire a controller with an in-process queue, fresh job store and initialized storage.
    pub fn build_controller(
        &self,
        designs: Arc<dyn DesignRepository>,
        engine: Engine,
        asset_root: Option<PathBuf>,
    ) -> StratumResult<ExportController> {
        let storage = ArtifactStorage::new(self.export_root.clone());
        storage.init()?;
        let converter: Arc<dyn Converter> = match engine {
            Engine::External => Arc::new(self.external_converter()),
            Engine::Builtin => Arc::new(RasterConverter::new(asset_root.clone())),
        };
        Ok(ExportController::new(
            designs,
            Arc::new(JobStore::new()),
            Arc::new(InProcessQueue::new()),
            converter,
            storage,
        )
        .with_settings(self.controller_settings(asset_root)))
    }
}

/// Conversion backend selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Engine {
    /// External rasterizer and transcoder programs.
    #[default]
    External,
    /// In-process SVG rasterizer (svg, png and jpg only).
    Builtin,
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> StratumResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| StratumError::validation(format!("invalid value for `{key}`: {e}")))
}

fn invalid(key: &'static str, reason: impl Into<String>) -> StratumError {
    StratumError::validation(format!(
        "invalid configuration for `{key}`: {}",
        reason.into()
    ))
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
