//! Signal analysis trait definitions and descriptor containers

use crate::audio::SampleBuffer;
use anyhow::Result;

/// Signal analysis backend - allows swapping the spectral analyzer for a
/// deterministic one in tests
pub trait SignalAnalysis {
    /// Estimate the global tempo in beats per minute
    fn tempo(&self, buffer: &SampleBuffer) -> Result<f32>;

    /// Compute one descriptor kind at the given hop size
    ///
    /// The returned frame count is chosen by the implementation and may
    /// differ slightly from `buffer.len() / hop`.
    fn describe(&self, buffer: &SampleBuffer, kind: DescriptorKind, hop: usize)
        -> Result<DescriptorTable>;

    /// Harmonic component of the buffer (percussive energy removed)
    fn harmonic(&self, buffer: &SampleBuffer) -> Result<SampleBuffer>;
}

/// Descriptor kinds the feature matrix is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Rms,
    OnsetStrength,
    SpectralCentroid,
    SpectralBandwidth,
    SpectralRolloff,
    SpectralFlatness,
    ZeroCrossingRate,
    Mfcc,
    Chroma,
    Tonnetz,
    SpectralContrast,
}

impl DescriptorKind {
    /// Number of rows a table of this kind carries
    pub fn rows(self) -> usize {
        match self {
            DescriptorKind::Mfcc => 20,
            DescriptorKind::Chroma => 12,
            DescriptorKind::Tonnetz => 6,
            DescriptorKind::SpectralContrast => 7,
            _ => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DescriptorKind::Rms => "rms",
            DescriptorKind::OnsetStrength => "onset_strength",
            DescriptorKind::SpectralCentroid => "spectral_centroid",
            DescriptorKind::SpectralBandwidth => "spectral_bandwidth",
            DescriptorKind::SpectralRolloff => "spectral_rolloff",
            DescriptorKind::SpectralFlatness => "spectral_flatness",
            DescriptorKind::ZeroCrossingRate => "zero_crossing_rate",
            DescriptorKind::Mfcc => "mfcc",
            DescriptorKind::Chroma => "chroma",
            DescriptorKind::Tonnetz => "tonnetz",
            DescriptorKind::SpectralContrast => "spectral_contrast",
        }
    }
}

/// Per-frame descriptor values, `rows x frames`
///
/// Scalar descriptors have a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorTable {
    pub rows: Vec<Vec<f32>>,
}

impl DescriptorTable {
    pub fn new(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    /// Single-row table
    pub fn scalar(values: Vec<f32>) -> Self {
        Self { rows: vec![values] }
    }

    /// `rows x frames` table filled with zeros
    pub fn zeros(rows: usize, frames: usize) -> Self {
        Self {
            rows: vec![vec![0.0; frames]; rows],
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Frame count (length of the first row)
    pub fn frames(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    /// Column of values for one frame
    pub fn column(&self, frame: usize) -> Vec<f32> {
        self.rows.iter().map(|row| row[frame]).collect()
    }

    /// Mean of each row across all frames
    pub fn row_means(&self) -> Vec<f32> {
        self.rows
            .iter()
            .map(|row| {
                if row.is_empty() {
                    0.0
                } else {
                    (row.iter().map(|&v| v as f64).sum::<f64>() / row.len() as f64) as f32
                }
            })
            .collect()
    }

    /// Drop the row structure of a scalar table
    pub fn into_scalar(mut self) -> Vec<f32> {
        if self.rows.is_empty() {
            Vec::new()
        } else {
            self.rows.swap_remove(0)
        }
    }
}
