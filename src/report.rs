//! End-of-run import report.

use serde::Serialize;

/// Summary of one import run: counts plus every non-fatal warning, in the
/// order it was emitted. Warnings never stop the stream; fatal conditions
/// surface as errors from the run instead.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Distinct entity ids seen in the input.
    pub entities: usize,
    /// Entities newly created by the persistence layer.
    pub created: usize,
    /// Entities updated in place.
    pub updated: usize,
    /// Rows rejected by row-level validation.
    pub rejected_rows: usize,
    /// Circuit-step links newly created at resolution time.
    pub links_created: usize,
    /// Accumulated human-readable warnings.
    pub warnings: Vec<String>,
}

impl ImportReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a warning and mirror it to the log.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[TrekImport] {}", message);
        self.warnings.push(message);
    }

    /// Absorb warnings already logged at their emission site.
    pub fn absorb(&mut self, warnings: Vec<String>) {
        self.warnings.extend(warnings);
    }
}
