use std::sync::Mutex;

use crate::convert::format::{
    ArtifactHandle, ConvertRequest, Converter, artifact_handle, ensure_parent_dir,
};
use crate::foundation::error::{StratumError, StratumResult};
use crate::render::document::Document;
use crate::render::svg::to_svg;

/// Scripted failure for [`InMemoryConverter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Fail with [`StratumError::Conversion`].
    Conversion {
        /// Error message.
        message: String,
        /// Diagnostics.
        diagnostics: String,
    },
    /// Fail with [`StratumError::Timeout`].
    Timeout,
    /// Panic inside `convert`.
    Panic,
}

/// Converter for tests: records every request and writes the document's SVG bytes.
#[derive(Debug, Default)]
pub struct InMemoryConverter {
    requests: Mutex<Vec<ConvertRequest>>,
    failures: Mutex<Vec<ScriptedFailure>>,
}

impl InMemoryConverter {
    /// Create a converter that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for an upcoming call; failures are consumed in order.
    pub fn fail_next(&self, failure: ScriptedFailure) {
        if let Ok(mut f) = self.failures.lock() {
            f.push(failure);
        }
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<ConvertRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Converter for InMemoryConverter {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn convert(&self, doc: &Document, request: &ConvertRequest) -> StratumResult<ArtifactHandle> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(request.clone());
        }
        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|mut f| (!f.is_empty()).then(|| f.remove(0)));
        match failure {
            Some(ScriptedFailure::Conversion {
                message,
                diagnostics,
            }) => return Err(StratumError::conversion(message, diagnostics)),
            Some(ScriptedFailure::Timeout) => {
                return Err(StratumError::timeout("scripted converter timeout"));
            }
            Some(ScriptedFailure::Panic) => panic!("scripted converter panic"),
            None => {}
        }

        ensure_parent_dir(&request.output_path)?;
        let doc = request.options.apply_background(doc, request.format);
        std::fs::write(&request.output_path, to_svg(&doc)).map_err(|e| {
            StratumError::storage(format!(
                "failed to write '{}': {e}",
                request.output_path.display()
            ))
        })?;
        artifact_handle(&request.output_path, request.format)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/convert/memory.rs"]
mod tests;
