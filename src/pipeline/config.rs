//! Analysis configuration

use crate::error::AnalysisError;
use crate::watermark::{BitDepth, WatermarkHash};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What the report carries besides the scalar summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Inline 100-point waveform envelope
    Waveform,
    /// Feature matrix written to a side file, path in the report
    #[default]
    MatrixFile,
    /// Feature matrix embedded in the report
    MatrixInline,
}

/// Configuration for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Rows in the feature matrix
    pub frames_target: usize,

    /// Points in the waveform envelope
    pub waveform_points: usize,

    /// Hash used to derive the watermark payload
    pub watermark_hash: WatermarkHash,

    /// Bit depth of the rewritten file after watermarking
    pub output_bit_depth: BitDepth,

    pub output_mode: OutputMode,

    /// Resample decoded audio to this rate (None = keep native rate)
    pub target_sample_rate: Option<u32>,

    /// Directory for matrix side files
    pub matrix_dir: PathBuf,

    /// Tempo folding range
    pub min_bpm: Option<f32>,
    pub max_bpm: Option<f32>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            frames_target: 5000,
            waveform_points: 100,
            watermark_hash: WatermarkHash::Md5,
            output_bit_depth: BitDepth::Pcm16,
            output_mode: OutputMode::MatrixFile,
            target_sample_rate: Some(22050),
            matrix_dir: std::env::temp_dir(),
            min_bpm: None,
            max_bpm: None,
        }
    }
}

impl AnalyzerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file; missing keys keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| AnalysisError::Config(e.to_string()))
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        Ok(config)
    }

    pub fn with_frames_target(mut self, frames: usize) -> Self {
        self.frames_target = frames;
        self
    }

    pub fn with_waveform_points(mut self, points: usize) -> Self {
        self.waveform_points = points;
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn with_bit_depth(mut self, depth: BitDepth) -> Self {
        self.output_bit_depth = depth;
        self
    }

    pub fn with_sample_rate(mut self, rate: Option<u32>) -> Self {
        self.target_sample_rate = rate;
        self
    }

    pub fn with_matrix_dir(mut self, dir: PathBuf) -> Self {
        self.matrix_dir = dir;
        self
    }

    pub fn with_bpm_range(mut self, min: f32, max: f32) -> Self {
        self.min_bpm = Some(min);
        self.max_bpm = Some(max);
        self
    }

    /// Reject values the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.frames_target == 0 {
            return Err(AnalysisError::Config("frames_target must be positive".into()).into());
        }
        if self.waveform_points == 0 {
            return Err(AnalysisError::Config("waveform_points must be positive".into()).into());
        }
        if self.target_sample_rate == Some(0) {
            return Err(AnalysisError::Config("target_sample_rate must be positive".into()).into());
        }
        if let (Some(min), Some(max)) = (self.min_bpm, self.max_bpm) {
            if min <= 0.0 || max < min * 2.0 {
                return Err(AnalysisError::Config(format!(
                    "BPM range {}-{} must be positive and span at least an octave",
                    min, max
                ))
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::new();
        assert_eq!(config.frames_target, 5000);
        assert_eq!(config.waveform_points, 100);
        assert_eq!(config.output_bit_depth, BitDepth::Pcm16);
        assert_eq!(config.output_mode, OutputMode::MatrixFile);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_frames() {
        let config = AnalyzerConfig::new().with_frames_target(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_narrow_bpm_range() {
        let config = AnalyzerConfig::new().with_bpm_range(100.0, 150.0);
        assert!(config.validate().is_err());
        let config = AnalyzerConfig::new().with_bpm_range(70.0, 170.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("analyzer.toml");
        std::fs::write(
            &path,
            "frames_target = 1200\noutput_mode = \"waveform\"\noutput_bit_depth = 24\n",
        )
        .unwrap();

        let config = AnalyzerConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.frames_target, 1200);
        assert_eq!(config.output_mode, OutputMode::Waveform);
        assert_eq!(config.output_bit_depth, BitDepth::Pcm24);
        assert_eq!(config.waveform_points, 100);
    }

    #[test]
    fn test_toml_rejects_bad_bit_depth() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("analyzer.toml");
        std::fs::write(&path, "output_bit_depth = 12\n").unwrap();
        assert!(AnalyzerConfig::from_toml_file(&path).is_err());
    }
}
