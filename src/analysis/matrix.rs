//! Acoustic feature matrix
//!
//! Builds a fixed number of time-aligned rows from the analyzer output. The
//! hop size is derived from the buffer length so the analyzer produces
//! roughly `frames_target` frames; whatever it actually returns is then
//! forced to exactly `frames_target` by the frame resampler.

use super::frames::{fit_table_to_frames, fit_to_frames, frames_to_time};
use super::round_to;
use super::traits::{DescriptorKind, DescriptorTable, SignalAnalysis};
use crate::audio::SampleBuffer;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Decimal places of every value in the matrix
const MATRIX_DECIMALS: u32 = 4;

/// One row of the feature matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedFrame {
    pub frame_index: usize,
    /// Seconds from the start of the buffer
    pub t: f64,
    /// RMS energy, normalized to the loudest frame
    pub rms: f64,
    /// Onset strength, normalized to the strongest frame
    pub onset_strength: f64,
    pub spectral_centroid: f64,
    pub spectral_bandwidth: f64,
    pub spectral_rolloff: f64,
    pub spectral_flatness: f64,
    pub zero_crossing_rate: f64,
    pub mfcc: Vec<f64>,
    pub chroma: Chroma,
    pub tonnetz: Vec<f64>,
    pub contrast: Vec<f64>,
}

/// Chroma energy per pitch class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chroma {
    #[serde(rename = "C")]
    pub c: f64,
    #[serde(rename = "C#")]
    pub c_sharp: f64,
    #[serde(rename = "D")]
    pub d: f64,
    #[serde(rename = "D#")]
    pub d_sharp: f64,
    #[serde(rename = "E")]
    pub e: f64,
    #[serde(rename = "F")]
    pub f: f64,
    #[serde(rename = "F#")]
    pub f_sharp: f64,
    #[serde(rename = "G")]
    pub g: f64,
    #[serde(rename = "G#")]
    pub g_sharp: f64,
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "A#")]
    pub a_sharp: f64,
    #[serde(rename = "B")]
    pub b: f64,
}

impl Chroma {
    /// Build from 12 bins ordered C..B; missing bins are 0
    pub fn from_bins(bins: &[f64]) -> Self {
        let bin = |i: usize| bins.get(i).copied().unwrap_or(0.0);
        Self {
            c: bin(0),
            c_sharp: bin(1),
            d: bin(2),
            d_sharp: bin(3),
            e: bin(4),
            f: bin(5),
            f_sharp: bin(6),
            g: bin(7),
            g_sharp: bin(8),
            a: bin(9),
            a_sharp: bin(10),
            b: bin(11),
        }
    }
}

/// Hop size that makes the analyzer emit about `frames_target` frames
pub fn derive_hop(total_samples: usize, frames_target: usize) -> usize {
    (total_samples / frames_target.max(1)).max(1)
}

/// Divide by the maximum value; all-zero (or non-positive) input is left as is
pub fn normalize_by_max(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max > 0.0 {
        for v in values.iter_mut() {
            *v /= max;
        }
    }
}

/// Assemble exactly `frames_target` rows of acoustic features
pub fn assemble<A: SignalAnalysis + ?Sized>(
    analyzer: &A,
    buffer: &SampleBuffer,
    frames_target: usize,
) -> Result<Vec<FixedFrame>> {
    let hop = derive_hop(buffer.len(), frames_target);
    log::debug!(
        "Feature matrix: {} samples, {} target frames, hop {}",
        buffer.len(),
        frames_target,
        hop
    );

    let describe = |buf: &SampleBuffer, kind: DescriptorKind| -> Result<DescriptorTable> {
        let raw = analyzer
            .describe(buf, kind, hop)
            .with_context(|| format!("Failed to compute {}", kind.name()))?;
        if raw.frames() != frames_target {
            log::trace!(
                "{}: {} raw frames fitted to {}",
                kind.name(),
                raw.frames(),
                frames_target
            );
        }
        Ok(fit_table_to_frames(&raw, frames_target))
    };
    let scalar = |kind: DescriptorKind| -> Result<Vec<f32>> {
        Ok(fit_to_frames(
            &describe(buffer, kind)?.into_scalar(),
            frames_target,
        ))
    };

    let mut rms = scalar(DescriptorKind::Rms)?;
    let mut onset = scalar(DescriptorKind::OnsetStrength)?;
    let centroid = scalar(DescriptorKind::SpectralCentroid)?;
    let bandwidth = scalar(DescriptorKind::SpectralBandwidth)?;
    let rolloff = scalar(DescriptorKind::SpectralRolloff)?;
    let flatness = scalar(DescriptorKind::SpectralFlatness)?;
    let zcr = scalar(DescriptorKind::ZeroCrossingRate)?;
    let mfcc = describe(buffer, DescriptorKind::Mfcc)?;
    let chroma = describe(buffer, DescriptorKind::Chroma)?;
    let contrast = describe(buffer, DescriptorKind::SpectralContrast)?;

    let harmonic = analyzer
        .harmonic(buffer)
        .context("Failed to separate harmonic component")?;
    let tonnetz = describe(&harmonic, DescriptorKind::Tonnetz)?;

    normalize_by_max(&mut rms);
    normalize_by_max(&mut onset);

    let times = frames_to_time(frames_target, hop, buffer.sample_rate);
    let round = |v: f32| round_to(v as f64, MATRIX_DECIMALS);
    let column = |table: &DescriptorTable, i: usize| -> Vec<f64> {
        table.rows.iter().map(|row| round(row[i])).collect()
    };

    let matrix: Vec<FixedFrame> = (0..frames_target)
        .map(|i| FixedFrame {
            frame_index: i,
            t: round_to(times[i], MATRIX_DECIMALS),
            rms: round(rms[i]),
            onset_strength: round(onset[i]),
            spectral_centroid: round(centroid[i]),
            spectral_bandwidth: round(bandwidth[i]),
            spectral_rolloff: round(rolloff[i]),
            spectral_flatness: round(flatness[i]),
            zero_crossing_rate: round(zcr[i]),
            mfcc: column(&mfcc, i),
            chroma: Chroma::from_bins(&column(&chroma, i)),
            tonnetz: column(&tonnetz, i),
            contrast: column(&contrast, i),
        })
        .collect();

    log::info!("Feature matrix assembled: {} frames", matrix.len());
    Ok(matrix)
}
