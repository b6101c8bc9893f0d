/// Convenience result type used across Stratum.
pub type StratumResult<T> = Result<T, StratumError>;

/// Top-level error taxonomy used by pipeline APIs.
///
/// `Validation` and `Cycle` are input errors returned synchronously to callers. Every other
/// variant may surface on an export job once it has entered `processing`.
#[derive(thiserror::Error, Debug)]
pub enum StratumError {
    /// Invalid user-provided input (unknown format, malformed layer kind or properties).
    #[error("validation error: {0}")]
    Validation(String),

    /// A reparent request would make a layer its own ancestor.
    #[error("cycle error: {0}")]
    Cycle(String),

    /// Unrecoverable fault while building a document from a layer tree.
    #[error("render error: {0}")]
    Render(String),

    /// External conversion failed (nonzero exit or missing output).
    ///
    /// `diagnostics` holds captured subprocess output and is kept out of `Display`.
    #[error("conversion error: {message}")]
    Conversion {
        /// Human-readable summary.
        message: String,
        /// Raw subprocess output for internal diagnostics.
        diagnostics: String,
    },

    /// A bounded operation did not finish in time.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// Artifact or scratch storage could not be written or read.
    #[error("storage error: {0}")]
    Storage(String),

    /// A referenced design, layer or job does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested job transition is not permitted from the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StratumError {
    /// Build a [`StratumError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`StratumError::Cycle`] value.
    pub fn cycle(msg: impl Into<String>) -> Self {
        Self::Cycle(msg.into())
    }

    /// Build a [`StratumError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build a [`StratumError::Conversion`] value.
    pub fn conversion(msg: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::Conversion {
            message: msg.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Build a [`StratumError::Timeout`] value.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Build a [`StratumError::Storage`] value.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Build a [`StratumError::NotFound`] value.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build a [`StratumError::InvalidState`] value.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Stable machine-readable category exposed on failed jobs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Cycle(_) => "cycle",
            Self::Render(_) => "render",
            Self::Conversion { .. } => "conversion",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage",
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Other(_) => "internal",
        }
    }

    /// Internal diagnostics attached to the error, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Conversion { diagnostics, .. } if !diagnostics.is_empty() => {
                Some(diagnostics.as_str())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
