//! JSON exporter for simulation runs.
//!
//! An export is the engine's persisted document (the same shape the engine
//! restores from) wrapped with the run summary, so a failing seed can be
//! loaded straight back into a viewer.

use crate::error::SimError;
use crate::runner::{ScenarioMetrics, ScenarioResult};
use motionview_core::SavedDocument;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Complete simulation export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Virtual duration in seconds
    pub duration_sec: f64,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub metrics: ScenarioMetrics,

    /// The engine's document at the end of the run
    pub document: SavedDocument,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            passed: false,
            failure_reason: None,
            metrics: ScenarioMetrics::default(),
            document: SavedDocument::default(),
        }
    }

    pub fn from_result(result: &ScenarioResult) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            duration_sec: result.final_time_secs,
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
            metrics: result.metrics.clone(),
            document: result.document.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScenarioRunner;
    use crate::scenarios::ScenarioId;

    #[test]
    fn test_export_document_restores() {
        let result = ScenarioRunner::new(5).with_duration(2.0).run(ScenarioId::SteadyStream);
        let export = SimExport::from_result(&result);
        assert_eq!(export.scenario, "steady_stream");

        let json = export.to_json().unwrap_or_default();
        let back: SimExport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.document.robot_path.len(), result.document.robot_path.len());

        // The embedded document is a regular saved document
        let doc_json = serde_json::to_string(&back.document).unwrap();
        let doc = SavedDocument::from_json_str(&doc_json).unwrap();
        assert_eq!(doc.poses().len() as u64, result.metrics.poses_added);
    }

    #[test]
    fn test_write_to_file() {
        let path = std::env::temp_dir().join(format!("motionview-export-{}.json", std::process::id()));
        SimExport::new("plan_editing", 1).write_to_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"planned-path\""));
        std::fs::remove_file(&path).ok();
    }
}
