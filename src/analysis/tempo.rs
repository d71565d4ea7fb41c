//! Tempo estimation
//!
//! stratum-dsp is tried first. Clips too short for it, silent input, or any
//! stratum failure fall back to autocorrelating the onset-strength envelope
//! under a log-normal prior centred on 120 BPM.

use crate::audio::SampleBuffer;
use anyhow::Result;
use stratum_dsp::{analyze_audio, AnalysisConfig};

/// Minimum clip length handed to stratum-dsp
const MIN_STRATUM_SECS: f64 = 1.0;
/// Hop for the fallback onset envelope
const ONSET_HOP: usize = 512;
const MIN_TEMPO: f32 = 30.0;
const MAX_TEMPO: f32 = 300.0;
const PRIOR_CENTER_BPM: f32 = 120.0;
/// Prior width in octaves
const PRIOR_STD_OCTAVES: f32 = 1.0;

/// Estimate tempo, using `onset` to compute the fallback envelope
pub fn estimate<F>(buffer: &SampleBuffer, onset: F) -> Result<f32>
where
    F: Fn(&SampleBuffer, usize) -> Vec<f32>,
{
    if buffer.duration_secs() >= MIN_STRATUM_SECS && !buffer.is_silent() {
        match stratum_tempo(buffer) {
            Ok(bpm) if bpm > 0.0 => {
                log::debug!("Tempo from stratum-dsp: {:.1} BPM", bpm);
                return Ok(bpm);
            }
            Ok(bpm) => log::warn!("stratum-dsp returned tempo {:.1}, using onset fallback", bpm),
            Err(e) => log::warn!("stratum-dsp tempo failed ({}), using onset fallback", e),
        }
    }

    let envelope = onset(buffer, ONSET_HOP);
    let bpm = autocorrelation_tempo(&envelope, buffer.sample_rate, ONSET_HOP);
    log::debug!("Tempo from onset autocorrelation: {:.1} BPM", bpm);
    Ok(bpm)
}

fn stratum_tempo(buffer: &SampleBuffer) -> Result<f32> {
    let config = AnalysisConfig::default();
    let result = analyze_audio(&buffer.samples, buffer.sample_rate, config)
        .map_err(|e| anyhow::anyhow!("Audio analysis failed: {:?}", e))?;
    Ok(result.bpm)
}

/// Dominant periodicity of an onset envelope in BPM, 0.0 when it is flat zero
pub fn autocorrelation_tempo(envelope: &[f32], sample_rate: u32, hop: usize) -> f32 {
    let frame_rate = sample_rate as f32 / hop as f32;
    let min_lag = ((60.0 * frame_rate / MAX_TEMPO).ceil() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / MIN_TEMPO).floor() as usize).min(envelope.len().saturating_sub(1));

    if min_lag > max_lag {
        return 0.0;
    }

    let mut best_lag = 0;
    let mut best_score = 0.0f32;
    for lag in min_lag..=max_lag {
        let ac: f32 = envelope
            .iter()
            .zip(&envelope[lag..])
            .map(|(&a, &b)| a * b)
            .sum();
        let bpm = 60.0 * frame_rate / lag as f32;
        let octaves = (bpm / PRIOR_CENTER_BPM).log2() / PRIOR_STD_OCTAVES;
        let score = ac * (-0.5 * octaves * octaves).exp();
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }

    if best_lag == 0 {
        0.0
    } else {
        60.0 * frame_rate / best_lag as f32
    }
}

/// Double or halve `bpm` until it sits inside the configured range
pub fn fold_into_range(bpm: f32, min_bpm: Option<f32>, max_bpm: Option<f32>) -> f32 {
    let (Some(min_bpm), Some(max_bpm)) = (min_bpm, max_bpm) else {
        return bpm;
    };
    let mut bpm = bpm;
    if min_bpm > 0.0 && max_bpm > 0.0 && bpm > 0.0 {
        while bpm < min_bpm && bpm * 2.0 <= max_bpm {
            bpm *= 2.0;
            log::debug!("BPM doubled to {:.1} (was below minimum {})", bpm, min_bpm);
        }
        while bpm > max_bpm && bpm / 2.0 >= min_bpm {
            bpm /= 2.0;
            log::debug!("BPM halved to {:.1} (was above maximum {})", bpm, max_bpm);
        }
    }
    bpm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_train_tempo() {
        // One impulse every 0.5s at ~43 frames/s -> 120 BPM
        let sr = 22050;
        let frame_rate = sr as f32 / ONSET_HOP as f32;
        let period = (0.5 * frame_rate).round() as usize;
        let envelope: Vec<f32> = (0..1000)
            .map(|i| if i % period == 0 { 1.0 } else { 0.0 })
            .collect();
        let bpm = autocorrelation_tempo(&envelope, sr, ONSET_HOP);
        let expected = 60.0 * frame_rate / period as f32;
        assert!((bpm - expected).abs() < 0.01, "bpm {}", bpm);
    }

    #[test]
    fn test_flat_envelope_has_no_tempo() {
        assert_eq!(autocorrelation_tempo(&vec![0.0; 500], 22050, ONSET_HOP), 0.0);
        assert_eq!(autocorrelation_tempo(&[], 22050, ONSET_HOP), 0.0);
    }

    #[test]
    fn test_silence_uses_fallback() {
        let buffer = SampleBuffer::silence(44100, 22050);
        let bpm = estimate(&buffer, |b, hop| vec![0.0; 1 + b.len() / hop]).unwrap();
        assert_eq!(bpm, 0.0);
    }

    #[test]
    fn test_fold_into_range() {
        assert_eq!(fold_into_range(60.0, Some(70.0), Some(170.0)), 120.0);
        assert_eq!(fold_into_range(180.0, Some(70.0), Some(170.0)), 90.0);
        assert_eq!(fold_into_range(100.0, Some(70.0), Some(170.0)), 100.0);
        assert_eq!(fold_into_range(60.0, None, None), 60.0);
        assert_eq!(fold_into_range(0.0, Some(70.0), Some(170.0)), 0.0);
    }
}
