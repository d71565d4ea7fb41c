//! Coarse waveform envelope for visualization
//!
//! The buffer is cut into `points` chunks of `len / points` samples (the
//! last one also takes the remainder) and each chunk is reduced to its peak
//! absolute amplitude. Peaks are normalized against the loudest
//! chunk so the envelope always spans [0, 1].

use super::round_to;
use crate::audio::SampleBuffer;

/// Decimal places kept in the normalized envelope
const ENVELOPE_DECIMALS: u32 = 3;

/// Reduce a buffer to exactly `points` normalized peak values
pub fn envelope(buffer: &SampleBuffer, points: usize) -> Vec<f64> {
    peak_envelope(&buffer.samples, points)
}

/// Peak envelope over raw samples
///
/// Input shorter than `points` gets one sample per chunk and zeros after it.
pub fn peak_envelope(samples: &[f32], points: usize) -> Vec<f64> {
    if points == 0 {
        return Vec::new();
    }

    let samples_per_point = samples.len() / points;

    let mut peaks = vec![0.0f32; points];
    if samples_per_point == 0 {
        for (peak, s) in peaks.iter_mut().zip(samples) {
            *peak = s.abs();
        }
    } else {
        for (i, peak) in peaks.iter_mut().enumerate() {
            let start = i * samples_per_point;
            let end = if i + 1 == points {
                samples.len()
            } else {
                start + samples_per_point
            };
            *peak = chunk_peak(&samples[start..end]);
        }
    }

    let max_peak = peaks.iter().copied().fold(0.0f32, f32::max);
    if max_peak > 0.0 {
        for peak in &mut peaks {
            *peak /= max_peak;
        }
    }

    log::debug!(
        "Envelope: samples_per_point={}, chunks={}, max_peak={:.4}",
        samples_per_point,
        peaks.len(),
        max_peak
    );

    peaks
        .into_iter()
        .map(|p| round_to(p as f64, ENVELOPE_DECIMALS))
        .collect()
}

#[inline]
fn chunk_peak(chunk: &[f32]) -> f32 {
    chunk.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_point_count() {
        let samples: Vec<f32> = (0..1234).map(|i| ((i as f32) * 0.01).sin() * 0.5).collect();
        let env = peak_envelope(&samples, 100);
        assert_eq!(env.len(), 100);
        assert!(env.iter().all(|&v| (0.0..=1.0).contains(&v)));
        let max = env.iter().copied().fold(0.0f64, f64::max);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn test_short_buffer_pads_with_zeros() {
        let env = peak_envelope(&[0.2, -0.4, 0.1], 100);
        assert_eq!(env.len(), 100);
        assert_eq!(&env[..3], &[0.5, 1.0, 0.25]);
        assert!(env[3..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_silence_stays_zero() {
        let env = peak_envelope(&vec![0.0; 5000], 100);
        assert_eq!(env.len(), 100);
        assert!(env.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_remainder_belongs_to_last_chunk() {
        // 250 samples / 100 points = 2 per chunk, last chunk spans 198..250
        let mut samples = vec![0.0f32; 250];
        samples[249] = 0.8;
        let env = peak_envelope(&samples, 100);
        assert_eq!(env.len(), 100);
        assert_eq!(env[99], 1.0);
        assert!(env[..99].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_remainder_does_not_rescale_other_chunks() {
        let mut samples = vec![0.1f32; 250];
        samples[249] = 1.0;
        let env = peak_envelope(&samples, 100);
        assert_eq!(env[0], 0.1);
        assert_eq!(env[99], 1.0);
    }

    #[test]
    fn test_tiny_peak_still_normalizes() {
        let mut samples = vec![0.0f32; 1000];
        samples[500] = 1e-6;
        let env = peak_envelope(&samples, 100);
        assert_eq!(env[50], 1.0);
    }
}
