//! Track Analyzer - audio fingerprinting and watermarking
//!
//! Decodes one audio file, extracts tempo, key and energy, builds a
//! fixed-length feature matrix or waveform envelope, and optionally embeds an
//! LSB watermark before rewriting the file as integer PCM.

pub mod analysis;
pub mod audio;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod watermark;

pub use error::AnalysisError;
pub use pipeline::{AnalysisPipeline, AnalysisReport, AnalysisRequest, AnalyzerConfig};
