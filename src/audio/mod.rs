//! Sample buffers and audio decoding
//!
//! Everything downstream works on a single mono `SampleBuffer`. Decoding is
//! done once per run by symphonia; the buffer is then owned by the pipeline.

mod decode;

pub use decode::{load, resample};

/// Mono PCM samples in [-1.0, 1.0] at a fixed sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Buffer of `len` zero samples
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0.0)
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    /// Clamp every sample into [-1.0, 1.0]
    pub fn clamp(&mut self) {
        for s in &mut self.samples {
            *s = s.clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let buffer = SampleBuffer::silence(22050, 44100);
        assert!((buffer.duration_secs() - 0.5).abs() < 1e-9);
        assert!(buffer.is_silent());
    }

    #[test]
    fn test_clamp_and_peak() {
        let mut buffer = SampleBuffer::new(vec![1.5, -2.0, 0.25], 8000);
        assert!((buffer.peak() - 2.0).abs() < 1e-6);
        buffer.clamp();
        assert_eq!(buffer.samples, vec![1.0, -1.0, 0.25]);
        assert!(!buffer.is_silent());
    }
}
