//! JSON report printed on stdout
//!
//! Exactly one object is emitted per run: either the analysis summary or
//! `{"error": "..."}`. The two shapes never mix.

use crate::analysis::FixedFrame;
use crate::model::PitchClass;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnalysisReport {
    Success(AnalysisSummary),
    Failure { error: String },
}

/// Scalar summary plus one detail payload
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    /// Seconds, 2 decimals
    pub duration: f64,
    pub bpm: u32,
    pub key: PitchClass,
    /// Mean RMS x 100, 2 decimals
    pub energy: f64,
    pub watermarked: bool,
    #[serde(flatten)]
    pub detail: ReportDetail,
}

/// The mode-dependent part of the summary
#[derive(Debug, Clone, Serialize)]
pub enum ReportDetail {
    #[serde(rename = "waveform")]
    Waveform(Vec<f64>),
    #[serde(rename = "matrix_file_path")]
    MatrixFile(PathBuf),
    #[serde(rename = "matrix")]
    Matrix(Vec<FixedFrame>),
}

impl AnalysisReport {
    /// Error report carrying the full context chain
    pub fn from_error(err: &anyhow::Error) -> Self {
        AnalysisReport::Failure {
            error: format!("{:#}", err),
        }
    }

    /// Single-line JSON
    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => serde_json::json!({ "error": format!("Error serializing result: {}", e) })
                .to_string(),
        }
    }
}
