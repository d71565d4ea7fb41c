//! Harmonic/percussive separation by median filtering
//!
//! Harmonic energy is smooth along time, percussive energy is smooth along
//! frequency. Median-filtering the magnitude spectrogram in each direction
//! gives two estimates that are turned into a soft mask for the harmonic
//! part, which is then resynthesized.

use super::stft::{istft, stft};

const HPSS_N_FFT: usize = 2048;
const HPSS_HOP: usize = 512;
const KERNEL: usize = 31;
const MASK_POWER: i32 = 2;

/// Harmonic component of a signal, same length as the input
pub fn harmonic(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let mut spectrum = stft(samples, HPSS_N_FFT, HPSS_HOP);
    let magnitude: Vec<Vec<f32>> = spectrum
        .iter()
        .map(|frame| frame.iter().map(|c| c.norm()).collect())
        .collect();

    let harmonic = median_along_time(&magnitude, KERNEL);
    let percussive = median_along_frequency(&magnitude, KERNEL);

    for (t, frame) in spectrum.iter_mut().enumerate() {
        for (k, bin) in frame.iter_mut().enumerate() {
            *bin *= soft_mask(harmonic[t][k], percussive[t][k]);
        }
    }

    log::debug!(
        "HPSS: {} frames x {} bins, kernel {}",
        magnitude.len(),
        HPSS_N_FFT / 2 + 1,
        KERNEL
    );

    istft(&spectrum, HPSS_N_FFT, HPSS_HOP, samples.len())
}

/// Wiener-style mask selecting `x` against `reference`
fn soft_mask(x: f32, reference: f32) -> f32 {
    let z = x.max(reference);
    if z < f32::MIN_POSITIVE {
        return 0.0;
    }
    let mx = (x / z).powi(MASK_POWER);
    let mr = (reference / z).powi(MASK_POWER);
    mx / (mx + mr)
}

/// Mirror an out-of-range index back into `0..n` (edge sample repeated)
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

fn median(window: &mut [f32]) -> f32 {
    let mid = window.len() / 2;
    let (_, value, _) = window
        .select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    *value
}

fn median_filter_1d(values: &[f32], kernel: usize, out: &mut Vec<f32>) {
    let half = (kernel / 2) as isize;
    let n = values.len();
    let mut window = vec![0.0f32; kernel];
    out.clear();
    for i in 0..n as isize {
        for (w, slot) in window.iter_mut().enumerate() {
            *slot = values[reflect_index(i + w as isize - half, n)];
        }
        out.push(median(&mut window));
    }
}

/// Median filter each frequency bin across frames
fn median_along_time(magnitude: &[Vec<f32>], kernel: usize) -> Vec<Vec<f32>> {
    let frames = magnitude.len();
    let bins = magnitude.first().map(Vec::len).unwrap_or(0);
    let mut result = vec![vec![0.0f32; bins]; frames];

    let mut track = Vec::with_capacity(frames);
    let mut filtered = Vec::with_capacity(frames);
    for k in 0..bins {
        track.clear();
        track.extend(magnitude.iter().map(|frame| frame[k]));
        median_filter_1d(&track, kernel, &mut filtered);
        for (t, &v) in filtered.iter().enumerate() {
            result[t][k] = v;
        }
    }
    result
}

/// Median filter each frame across frequency bins
fn median_along_frequency(magnitude: &[Vec<f32>], kernel: usize) -> Vec<Vec<f32>> {
    let mut filtered = Vec::new();
    magnitude
        .iter()
        .map(|frame| {
            median_filter_1d(frame, kernel, &mut filtered);
            filtered.clone()
        })
        .collect()
}
