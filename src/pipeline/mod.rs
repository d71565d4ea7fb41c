//! Analysis orchestration and reporting

pub mod config;
pub mod report;
pub mod runner;

pub use config::{AnalyzerConfig, OutputMode};
pub use report::{AnalysisReport, AnalysisSummary, ReportDetail};
pub use runner::{AnalysisPipeline, AnalysisRequest, TrackSummary};
