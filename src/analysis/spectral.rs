//! Built-in signal analyzer
//!
//! Spectral and rhythmic descriptors computed from a centered STFT
//! (`n_fft = 2048`, Hann window). Defaults follow the conventions music
//! information retrieval tooling commonly uses: Slaney mel filterbank,
//! 80 dB dynamic range for log spectra, 85% rolloff, six contrast octaves
//! starting at 200 Hz.

use super::hpss;
use super::stft::{fft_frequencies, frame_count, magnitude_spectrogram};
use super::tempo;
use super::traits::{DescriptorKind, DescriptorTable, SignalAnalysis};
use crate::audio::SampleBuffer;
use crate::error::AnalysisError;
use anyhow::Result;

/// FFT size for every spectral descriptor
pub const N_FFT: usize = 2048;
/// Mel bands used for MFCC and onset strength
const N_MELS: usize = 128;
const N_MFCC: usize = 20;
/// Power floor for logarithms
const AMIN: f32 = 1e-10;
const TOP_DB: f32 = 80.0;
const ROLL_PERCENT: f32 = 0.85;
const CONTRAST_FMIN: f32 = 200.0;
const CONTRAST_BANDS: usize = 6;
const CONTRAST_QUANTILE: f32 = 0.02;
/// Samples closer to zero than this count as zero for crossings
const ZCR_THRESHOLD: f32 = 1e-10;
/// Lowest frequency folded into chroma (C1)
const CHROMA_FMIN: f32 = 32.7;

/// STFT-based implementation of [`SignalAnalysis`]
pub struct SpectralAnalyzer {
    /// Minimum BPM for tempo folding
    min_bpm: Option<f32>,
    /// Maximum BPM for tempo folding
    max_bpm: Option<f32>,
}

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self {
            min_bpm: None,
            max_bpm: None,
        }
    }

    /// Fold detected tempo into a BPM range
    pub fn with_bpm_range(mut self, min: Option<f32>, max: Option<f32>) -> Self {
        self.min_bpm = min;
        self.max_bpm = max;
        self
    }
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalAnalysis for SpectralAnalyzer {
    fn tempo(&self, buffer: &SampleBuffer) -> Result<f32> {
        let bpm = tempo::estimate(buffer, |b, hop| onset_strength(b, hop))?;
        Ok(tempo::fold_into_range(bpm, self.min_bpm, self.max_bpm))
    }

    fn describe(
        &self,
        buffer: &SampleBuffer,
        kind: DescriptorKind,
        hop: usize,
    ) -> Result<DescriptorTable> {
        if buffer.is_empty() {
            return Err(AnalysisError::EmptyBuffer.into());
        }
        let hop = hop.max(1);

        let table = match kind {
            DescriptorKind::Rms => DescriptorTable::scalar(rms(&buffer.samples, hop)),
            DescriptorKind::ZeroCrossingRate => {
                DescriptorTable::scalar(zero_crossing_rate(&buffer.samples, hop))
            }
            DescriptorKind::OnsetStrength => DescriptorTable::scalar(onset_strength(buffer, hop)),
            DescriptorKind::SpectralCentroid => {
                let spec = magnitude_spectrogram(&buffer.samples, N_FFT, hop);
                let freqs = fft_frequencies(buffer.sample_rate, N_FFT);
                DescriptorTable::scalar(spec.iter().map(|f| centroid(f, &freqs)).collect())
            }
            DescriptorKind::SpectralBandwidth => {
                let spec = magnitude_spectrogram(&buffer.samples, N_FFT, hop);
                let freqs = fft_frequencies(buffer.sample_rate, N_FFT);
                DescriptorTable::scalar(spec.iter().map(|f| bandwidth(f, &freqs)).collect())
            }
            DescriptorKind::SpectralRolloff => {
                let spec = magnitude_spectrogram(&buffer.samples, N_FFT, hop);
                let freqs = fft_frequencies(buffer.sample_rate, N_FFT);
                DescriptorTable::scalar(spec.iter().map(|f| rolloff(f, &freqs)).collect())
            }
            DescriptorKind::SpectralFlatness => {
                let spec = magnitude_spectrogram(&buffer.samples, N_FFT, hop);
                DescriptorTable::scalar(spec.iter().map(|f| flatness(f)).collect())
            }
            DescriptorKind::Mfcc => mfcc(buffer, hop),
            DescriptorKind::Chroma => chroma(buffer, hop),
            DescriptorKind::Tonnetz => tonnetz(&chroma(buffer, hop)),
            DescriptorKind::SpectralContrast => spectral_contrast(buffer, hop)?,
        };

        log::trace!(
            "{}: {} rows x {} frames (hop {})",
            kind.name(),
            table.row_count(),
            table.frames(),
            hop
        );

        Ok(table)
    }

    fn harmonic(&self, buffer: &SampleBuffer) -> Result<SampleBuffer> {
        if buffer.is_empty() {
            return Err(AnalysisError::EmptyBuffer.into());
        }
        Ok(SampleBuffer::new(
            hpss::harmonic(&buffer.samples),
            buffer.sample_rate,
        ))
    }
}

/// Frame-wise RMS over centered, zero-padded windows of `N_FFT` samples
fn rms(samples: &[f32], hop: usize) -> Vec<f32> {
    let pad = (N_FFT / 2) as isize;
    (0..frame_count(samples.len(), hop))
        .map(|t| {
            let start = (t * hop) as isize - pad;
            let lo = start.max(0) as usize;
            let hi = ((start + N_FFT as isize).max(0) as usize).min(samples.len());
            let sum_sq: f64 = samples
                .get(lo..hi)
                .unwrap_or(&[])
                .iter()
                .map(|&s| (s as f64) * (s as f64))
                .sum();
            (sum_sq / N_FFT as f64).sqrt() as f32
        })
        .collect()
}

/// Fraction of sign changes per centered, edge-padded frame
fn zero_crossing_rate(samples: &[f32], hop: usize) -> Vec<f32> {
    let pad = (N_FFT / 2) as isize;
    let last = samples.len() as isize - 1;
    let sign = |i: isize| -> bool {
        let s = samples[i.clamp(0, last) as usize];
        s < -ZCR_THRESHOLD
    };

    (0..frame_count(samples.len(), hop))
        .map(|t| {
            let start = (t * hop) as isize - pad;
            let crossings = (1..N_FFT as isize)
                .filter(|&k| sign(start + k) != sign(start + k - 1))
                .count();
            crossings as f32 / N_FFT as f32
        })
        .collect()
}

fn centroid(frame: &[f32], freqs: &[f32]) -> f32 {
    let total: f32 = frame.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    frame.iter().zip(freqs).map(|(&m, &f)| m * f).sum::<f32>() / total
}

fn bandwidth(frame: &[f32], freqs: &[f32]) -> f32 {
    let total: f32 = frame.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let c = centroid(frame, freqs);
    frame
        .iter()
        .zip(freqs)
        .map(|(&m, &f)| (m / total) * (f - c) * (f - c))
        .sum::<f32>()
        .sqrt()
}

fn rolloff(frame: &[f32], freqs: &[f32]) -> f32 {
    let threshold = ROLL_PERCENT * frame.iter().sum::<f32>();
    let mut cumulative = 0.0f32;
    for (&m, &f) in frame.iter().zip(freqs) {
        cumulative += m;
        if cumulative >= threshold {
            return f;
        }
    }
    freqs.last().copied().unwrap_or(0.0)
}

/// Geometric over arithmetic mean of the power spectrum
fn flatness(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let n = frame.len() as f64;
    let (log_sum, sum) = frame.iter().fold((0.0f64, 0.0f64), |(ls, s), &m| {
        let p = ((m * m).max(AMIN)) as f64;
        (ls + p.ln(), s + p)
    });
    ((log_sum / n).exp() / (sum / n)) as f32
}

fn hz_to_mel(hz: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f32).ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f32).ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Slaney-normalized triangular mel filterbank, `n_mels x bins`
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let freqs = fft_frequencies(sample_rate, n_fft);
    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);
    let mel_f: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let lower_width = (mel_f[m + 1] - mel_f[m]).max(f32::EPSILON);
            let upper_width = (mel_f[m + 2] - mel_f[m + 1]).max(f32::EPSILON);
            let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]).max(f32::EPSILON);
            freqs
                .iter()
                .map(|&f| {
                    let lower = (f - mel_f[m]) / lower_width;
                    let upper = (mel_f[m + 2] - f) / upper_width;
                    lower.min(upper).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

/// Log-power mel spectrogram, `frames x n_mels`, clipped to `TOP_DB` below peak
fn log_mel_spectrogram(buffer: &SampleBuffer, hop: usize) -> Vec<Vec<f32>> {
    let spec = magnitude_spectrogram(&buffer.samples, N_FFT, hop);
    let filters = mel_filterbank(buffer.sample_rate, N_FFT, N_MELS);

    let mut db: Vec<Vec<f32>> = spec
        .iter()
        .map(|frame| {
            filters
                .iter()
                .map(|weights| {
                    let energy: f32 = weights
                        .iter()
                        .zip(frame)
                        .map(|(&w, &m)| w * m * m)
                        .sum();
                    power_to_db(energy)
                })
                .collect()
        })
        .collect();

    let peak = db
        .iter()
        .flatten()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = peak - TOP_DB;
    for value in db.iter_mut().flatten() {
        *value = value.max(floor);
    }
    db
}

#[inline]
fn power_to_db(power: f32) -> f32 {
    10.0 * power.max(AMIN).log10()
}

/// Mean positive log-mel flux per frame; the first frame is 0
pub(crate) fn onset_strength(buffer: &SampleBuffer, hop: usize) -> Vec<f32> {
    let db = log_mel_spectrogram(buffer, hop);
    let mut onset = Vec::with_capacity(db.len());
    for t in 0..db.len() {
        if t == 0 {
            onset.push(0.0);
            continue;
        }
        let flux: f32 = db[t]
            .iter()
            .zip(&db[t - 1])
            .map(|(&cur, &prev)| (cur - prev).max(0.0))
            .sum();
        onset.push(flux / N_MELS as f32);
    }
    onset
}

/// Orthonormal DCT-II of the log-mel spectrum, first `N_MFCC` coefficients
fn mfcc(buffer: &SampleBuffer, hop: usize) -> DescriptorTable {
    let db = log_mel_spectrogram(buffer, hop);
    let n = N_MELS as f32;
    let basis: Vec<Vec<f32>> = (0..N_MFCC)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..N_MELS)
                .map(|m| {
                    scale
                        * (std::f32::consts::PI * k as f32 * (2 * m + 1) as f32 / (2.0 * n)).cos()
                })
                .collect()
        })
        .collect();

    let rows = basis
        .iter()
        .map(|b| {
            db.iter()
                .map(|frame| b.iter().zip(frame).map(|(&w, &v)| w * v).sum())
                .collect()
        })
        .collect();
    DescriptorTable::new(rows)
}

/// Pitch class (C = 0) of every FFT bin, `None` below `CHROMA_FMIN`
fn chroma_bin_map(sample_rate: u32, n_fft: usize) -> Vec<Option<usize>> {
    fft_frequencies(sample_rate, n_fft)
        .into_iter()
        .map(|f| {
            if f < CHROMA_FMIN {
                return None;
            }
            let semitones_from_a4 = (12.0 * (f / 440.0).log2()).round() as i64;
            Some((semitones_from_a4 + 9).rem_euclid(12) as usize)
        })
        .collect()
}

/// Power folded onto 12 pitch classes, each frame scaled to a max of 1
fn chroma(buffer: &SampleBuffer, hop: usize) -> DescriptorTable {
    let spec = magnitude_spectrogram(&buffer.samples, N_FFT, hop);
    let bin_map = chroma_bin_map(buffer.sample_rate, N_FFT);
    let mut rows = vec![Vec::with_capacity(spec.len()); 12];

    for frame in &spec {
        let mut bins = [0.0f32; 12];
        for (&m, pc) in frame.iter().zip(&bin_map) {
            if let Some(pc) = pc {
                bins[*pc] += m * m;
            }
        }
        let max = bins.iter().copied().fold(0.0f32, f32::max);
        for (row, value) in rows.iter_mut().zip(bins) {
            row.push(if max > 0.0 { value / max } else { 0.0 });
        }
    }

    DescriptorTable::new(rows)
}

/// Tonal centroid: fifths, minor thirds and major thirds as 2-D circles
fn tonnetz(chroma: &DescriptorTable) -> DescriptorTable {
    let scale = [7.0 / 6.0, 7.0 / 6.0, 3.0 / 2.0, 3.0 / 2.0, 2.0 / 3.0, 2.0 / 3.0];
    let radius = [1.0, 1.0, 1.0, 1.0, 0.5, 0.5];
    let phi: Vec<[f32; 12]> = (0..6)
        .map(|d| {
            let mut row = [0.0f32; 12];
            for (l, value) in row.iter_mut().enumerate() {
                let shift = if d % 2 == 0 { 0.5 } else { 0.0 };
                *value = radius[d]
                    * (std::f32::consts::PI * (scale[d] * l as f32 - shift)).cos();
            }
            row
        })
        .collect();

    let frames = chroma.frames();
    let mut rows = vec![Vec::with_capacity(frames); 6];
    for t in 0..frames {
        let column = chroma.column(t);
        let l1: f32 = column.iter().map(|v| v.abs()).sum();
        for (d, row) in rows.iter_mut().enumerate() {
            let value = if l1 > 0.0 {
                phi[d].iter().zip(&column).map(|(&p, &c)| p * c / l1).sum()
            } else {
                0.0
            };
            row.push(value);
        }
    }
    DescriptorTable::new(rows)
}

/// Peak-to-valley contrast in dB for six octave bands plus the remainder
fn spectral_contrast(buffer: &SampleBuffer, hop: usize) -> Result<DescriptorTable> {
    let nyquist = buffer.sample_rate as f32 / 2.0;
    let mut edges = vec![0.0f32];
    edges.extend((0..=CONTRAST_BANDS).map(|i| CONTRAST_FMIN * 2f32.powi(i as i32)));
    if edges[..=CONTRAST_BANDS].iter().any(|&e| e >= nyquist) {
        return Err(AnalysisError::Computation(format!(
            "Contrast band exceeds Nyquist ({} Hz) at {} Hz sample rate",
            nyquist, buffer.sample_rate
        ))
        .into());
    }

    let spec = magnitude_spectrogram(&buffer.samples, N_FFT, hop);
    let freqs = fft_frequencies(buffer.sample_rate, N_FFT);

    let bands: Vec<Vec<usize>> = (0..=CONTRAST_BANDS)
        .map(|k| {
            let (low, high) = (edges[k], edges[k + 1]);
            let mut members: Vec<bool> = freqs.iter().map(|&f| f >= low && f <= high).collect();
            if let Some(first) = members.iter().position(|&m| m) {
                if k > 0 && first > 0 {
                    members[first - 1] = true;
                }
                if k == CONTRAST_BANDS {
                    for m in members.iter_mut().skip(first + 1) {
                        *m = true;
                    }
                }
            }
            members
                .iter()
                .enumerate()
                .filter_map(|(i, &m)| m.then_some(i))
                .collect()
        })
        .collect();

    let mut rows = vec![Vec::with_capacity(spec.len()); bands.len()];
    let mut sorted = Vec::new();
    for frame in &spec {
        for (row, band) in rows.iter_mut().zip(&bands) {
            if band.is_empty() {
                row.push(0.0);
                continue;
            }
            sorted.clear();
            sorted.extend(band.iter().map(|&i| frame[i]));
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let n_q = ((CONTRAST_QUANTILE * sorted.len() as f32).round() as usize).max(1);
            let valley = sorted[..n_q].iter().sum::<f32>() / n_q as f32;
            let peak = sorted[sorted.len() - n_q..].iter().sum::<f32>() / n_q as f32;
            row.push(power_to_db(peak) - power_to_db(valley));
        }
    }

    Ok(DescriptorTable::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, secs: f32, amp: f32) -> SampleBuffer {
        let n = (sample_rate as f32 * secs) as usize;
        SampleBuffer::new(
            (0..n)
                .map(|i| {
                    amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
                })
                .collect(),
            sample_rate,
        )
    }

    #[test]
    fn test_frame_counts_follow_hop() {
        let analyzer = SpectralAnalyzer::new();
        let buffer = sine(440.0, 22050, 1.0, 0.5);
        for kind in [
            DescriptorKind::Rms,
            DescriptorKind::ZeroCrossingRate,
            DescriptorKind::SpectralCentroid,
            DescriptorKind::Mfcc,
            DescriptorKind::Chroma,
            DescriptorKind::SpectralContrast,
        ] {
            let table = analyzer.describe(&buffer, kind, 512).unwrap();
            assert_eq!(table.row_count(), kind.rows(), "{}", kind.name());
            assert_eq!(table.frames(), 1 + 22050 / 512, "{}", kind.name());
        }
    }

    #[test]
    fn test_sine_centroid_and_chroma() {
        let analyzer = SpectralAnalyzer::new();
        let buffer = sine(440.0, 22050, 1.0, 0.5);

        let centroid = analyzer
            .describe(&buffer, DescriptorKind::SpectralCentroid, 512)
            .unwrap()
            .into_scalar();
        let mid = centroid[centroid.len() / 2];
        assert!((mid - 440.0).abs() < 60.0, "centroid {}", mid);

        let chroma = analyzer.describe(&buffer, DescriptorKind::Chroma, 512).unwrap();
        let profile = chroma.row_means();
        let best = profile
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc })
            .0;
        assert_eq!(best, 9); // A
    }

    #[test]
    fn test_rms_of_full_scale_sine() {
        let buffer = sine(1000.0, 22050, 1.0, 1.0);
        let values = rms(&buffer.samples, 512);
        let mid = values[values.len() / 2];
        assert!((mid - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01);
    }

    #[test]
    fn test_zero_crossing_rate_tracks_frequency() {
        let low = sine(200.0, 22050, 0.5, 0.5);
        let high = sine(4000.0, 22050, 0.5, 0.5);
        let zl = zero_crossing_rate(&low.samples, 512);
        let zh = zero_crossing_rate(&high.samples, 512);
        assert!(zh[5] > zl[5] * 5.0);
    }

    #[test]
    fn test_silence_descriptors_are_finite() {
        let analyzer = SpectralAnalyzer::new();
        let buffer = SampleBuffer::silence(22050, 22050);
        for kind in [
            DescriptorKind::Rms,
            DescriptorKind::OnsetStrength,
            DescriptorKind::SpectralCentroid,
            DescriptorKind::SpectralBandwidth,
            DescriptorKind::SpectralRolloff,
            DescriptorKind::SpectralFlatness,
            DescriptorKind::ZeroCrossingRate,
            DescriptorKind::Mfcc,
            DescriptorKind::Chroma,
            DescriptorKind::Tonnetz,
            DescriptorKind::SpectralContrast,
        ] {
            let table = analyzer.describe(&buffer, kind, 1024).unwrap();
            assert!(
                table.rows.iter().flatten().all(|v| v.is_finite()),
                "{}",
                kind.name()
            );
        }
        let onset = analyzer
            .describe(&buffer, DescriptorKind::OnsetStrength, 1024)
            .unwrap()
            .into_scalar();
        assert!(onset.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_contrast_rejects_low_sample_rate() {
        let analyzer = SpectralAnalyzer::new();
        let buffer = sine(100.0, 8000, 0.5, 0.5);
        let err = analyzer
            .describe(&buffer, DescriptorKind::SpectralContrast, 256)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::Computation(_))
        ));
    }

    #[test]
    fn test_empty_buffer_is_an_error() {
        let analyzer = SpectralAnalyzer::new();
        let buffer = SampleBuffer::new(Vec::new(), 22050);
        assert!(analyzer.describe(&buffer, DescriptorKind::Rms, 512).is_err());
    }

    #[test]
    fn test_mel_scale_round_trip() {
        for hz in [0.0f32, 500.0, 1000.0, 4000.0, 11025.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 0.5);
        }
    }

    #[test]
    fn test_tonnetz_of_single_pitch_class() {
        let mut rows = vec![vec![0.0f32]; 12];
        rows[0][0] = 1.0; // C only
        let t = tonnetz(&DescriptorTable::new(rows));
        // C sits at angle 0 on every circle: sin terms 0, cos terms = radius
        assert!(t.rows[0][0].abs() < 1e-6);
        assert!((t.rows[1][0] - 1.0).abs() < 1e-6);
        assert!((t.rows[5][0] - 0.5).abs() < 1e-6);
    }
}
