//! Main analysis pipeline orchestration

use super::config::{AnalyzerConfig, OutputMode};
use super::report::{AnalysisSummary, ReportDetail};
use crate::analysis::{self, round_to, DescriptorKind, FixedFrame, SignalAnalysis};
use crate::audio::{self, SampleBuffer};
use crate::error::AnalysisError;
use crate::model::PitchClass;
use crate::watermark::{self, WatermarkPayload};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Hop used for the whole-track key and energy estimates
const SUMMARY_HOP: usize = 512;

/// Inputs of one invocation
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Audio file to analyze (overwritten when watermarking)
    pub path: PathBuf,
    /// Identifier to embed as a watermark
    pub watermark_id: Option<String>,
    /// Namespace for the matrix side file
    pub track_id: Option<String>,
}

impl AnalysisRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            watermark_id: None,
            track_id: None,
        }
    }

    pub fn with_watermark(mut self, id: impl Into<String>) -> Self {
        self.watermark_id = Some(id.into());
        self
    }

    pub fn with_track_id(mut self, id: impl Into<String>) -> Self {
        self.track_id = Some(id.into());
        self
    }

    /// Supplied track ID, or the MD5 of the input path
    pub fn resolved_track_id(&self) -> String {
        let raw = match &self.track_id {
            Some(id) => id.clone(),
            None => format!("{:x}", md5::compute(self.path.to_string_lossy().as_bytes())),
        };
        sanitize_file_stem(&raw)
    }
}

/// Whole-track scalars
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub duration: f64,
    pub bpm: u32,
    pub key: PitchClass,
    pub energy: f64,
}

/// Analysis pipeline over one audio file
pub struct AnalysisPipeline<A: SignalAnalysis> {
    config: AnalyzerConfig,
    analyzer: A,
}

impl<A: SignalAnalysis> AnalysisPipeline<A> {
    pub fn new(config: AnalyzerConfig, analyzer: A) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, analyzer })
    }

    /// Run the complete analysis for one request
    ///
    /// Nothing is written until every computation has succeeded; the audio
    /// file is then overwritten (if a watermark was requested) and the
    /// matrix side file written last.
    pub fn run(&self, request: &AnalysisRequest) -> Result<AnalysisSummary> {
        log::info!("Analyzing: {:?}", request.path);

        let mut buffer = audio::load(&request.path, self.config.target_sample_rate)
            .with_context(|| format!("Failed to load {:?}", request.path))?;

        let summary = self.summarize(&buffer)?;

        let (detail, pending_matrix) = match self.config.output_mode {
            OutputMode::Waveform => (
                ReportDetail::Waveform(analysis::envelope(&buffer, self.config.waveform_points)),
                None,
            ),
            OutputMode::MatrixInline => (ReportDetail::Matrix(self.matrix(&buffer)?), None),
            OutputMode::MatrixFile => {
                let matrix = self.matrix(&buffer)?;
                let path = self.matrix_path(&request.resolved_track_id());
                (ReportDetail::MatrixFile(path.clone()), Some((path, matrix)))
            }
        };

        let watermarked = match &request.watermark_id {
            Some(id) => {
                self.watermark(&mut buffer, id, &request.path)?;
                true
            }
            None => false,
        };

        if let Some((path, matrix)) = pending_matrix {
            write_matrix(&path, &matrix)?;
        }

        Ok(AnalysisSummary {
            duration: summary.duration,
            bpm: summary.bpm,
            key: summary.key,
            energy: summary.energy,
            watermarked,
            detail,
        })
    }

    /// Duration, tempo, key and energy of the whole buffer
    pub fn summarize(&self, buffer: &SampleBuffer) -> Result<TrackSummary> {
        let tempo = self
            .analyzer
            .tempo(buffer)
            .context("Tempo estimation failed")?;

        let chroma = self
            .analyzer
            .describe(buffer, DescriptorKind::Chroma, SUMMARY_HOP)
            .context("Chroma computation failed")?;
        let key = PitchClass::from_chroma_profile(&chroma.row_means());

        let rms = self
            .analyzer
            .describe(buffer, DescriptorKind::Rms, SUMMARY_HOP)
            .context("RMS computation failed")?;
        let mean_rms = rms.row_means().first().copied().unwrap_or(0.0);

        let summary = TrackSummary {
            duration: round_to(buffer.duration_secs(), 2),
            bpm: tempo.max(0.0) as u32,
            key,
            energy: round_to(mean_rms as f64 * 100.0, 2),
        };

        log::info!(
            "Summary: {:.2}s, {} BPM, key {}, energy {:.2}",
            summary.duration,
            summary.bpm,
            summary.key,
            summary.energy
        );
        Ok(summary)
    }

    fn matrix(&self, buffer: &SampleBuffer) -> Result<Vec<FixedFrame>> {
        analysis::assemble(&self.analyzer, buffer, self.config.frames_target)
            .context("Feature matrix assembly failed")
    }

    fn matrix_path(&self, track_id: &str) -> PathBuf {
        self.config
            .matrix_dir
            .join(format!("{}_matrix.json", track_id))
    }

    /// Embed `id` into the buffer and overwrite the source file with it
    fn watermark(&self, buffer: &mut SampleBuffer, id: &str, path: &Path) -> Result<()> {
        let payload = WatermarkPayload::derive(id, self.config.watermark_hash);
        let peak = buffer.peak();
        if peak > 1.0 {
            log::warn!("Peak {:.3} exceeds full scale, clipping before quantization", peak);
        }
        buffer.clamp();
        let report = watermark::embed(buffer, &payload);
        log::info!(
            "Watermark: {} bits at stride {} into {:?}",
            report.bits_written,
            report.stride,
            path
        );
        watermark::write_pcm(path, buffer, self.config.output_bit_depth)
            .with_context(|| format!("Failed to write watermarked audio to {:?}", path))
    }
}

/// Serialize the matrix to `path` as a JSON array
fn write_matrix(path: &Path, matrix: &[FixedFrame]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| AnalysisError::io(dir, e))?;
    }
    let json = serde_json::to_vec(matrix).context("Failed to serialize feature matrix")?;
    fs::write(path, json).map_err(|e| AnalysisError::io(path, e))?;
    log::info!("Feature matrix ({} frames) written to {:?}", matrix.len(), path);
    Ok(())
}

/// Keep IDs usable as a file name component
fn sanitize_file_stem(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
