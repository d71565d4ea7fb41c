//! Short-time Fourier transform and its inverse
//!
//! Frames are centered: the signal is zero-padded by `n_fft / 2` on both
//! sides, giving `1 + len / hop` frames. Spectra are stored frame-major,
//! `n_fft / 2 + 1` bins per frame.

use rustfft::{num_complex::Complex, FftPlanner};

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()
        })
        .collect()
}

/// Number of centered frames for a signal
pub fn frame_count(len: usize, hop: usize) -> usize {
    1 + len / hop.max(1)
}

/// Center frequency in Hz of every rfft bin
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f32> {
    (0..=n_fft / 2)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect()
}

/// Complex STFT, `frames x (n_fft / 2 + 1)`
pub fn stft(samples: &[f32], n_fft: usize, hop: usize) -> Vec<Vec<Complex<f32>>> {
    let hop = hop.max(1);
    let pad = n_fft / 2;
    let n_frames = frame_count(samples.len(), hop);
    let window = hann_window(n_fft);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);

    let mut frames = Vec::with_capacity(n_frames);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

    for t in 0..n_frames {
        let start = (t * hop) as isize - pad as isize;
        for (k, slot) in buffer.iter_mut().enumerate() {
            let j = start + k as isize;
            let sample = if j >= 0 && (j as usize) < samples.len() {
                samples[j as usize]
            } else {
                0.0
            };
            *slot = Complex::new(sample * window[k], 0.0);
        }
        fft.process(&mut buffer);
        frames.push(buffer[..=n_fft / 2].to_vec());
    }

    frames
}

/// Magnitude STFT, `frames x bins`
pub fn magnitude_spectrogram(samples: &[f32], n_fft: usize, hop: usize) -> Vec<Vec<f32>> {
    stft(samples, n_fft, hop)
        .into_iter()
        .map(|frame| frame.iter().map(|c| c.norm()).collect())
        .collect()
}

/// Inverse of [`stft`] by windowed overlap-add, trimmed to `length` samples
pub fn istft(frames: &[Vec<Complex<f32>>], n_fft: usize, hop: usize, length: usize) -> Vec<f32> {
    let hop = hop.max(1);
    let pad = n_fft / 2;
    let window = hann_window(n_fft);

    let mut planner = FftPlanner::<f32>::new();
    let ifft = planner.plan_fft_inverse(n_fft);

    let padded_len = n_fft + hop * frames.len().saturating_sub(1);
    let mut output = vec![0.0f32; padded_len];
    let mut window_sum = vec![0.0f32; padded_len];
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

    for (t, frame) in frames.iter().enumerate() {
        for (k, slot) in buffer.iter_mut().enumerate() {
            *slot = if k <= n_fft / 2 {
                frame[k]
            } else {
                frame[n_fft - k].conj()
            };
        }
        ifft.process(&mut buffer);

        let offset = t * hop;
        for k in 0..n_fft {
            output[offset + k] += buffer[k].re / n_fft as f32 * window[k];
            window_sum[offset + k] += window[k] * window[k];
        }
    }

    for (sample, &norm) in output.iter_mut().zip(window_sum.iter()) {
        if norm > f32::MIN_POSITIVE {
            *sample /= norm;
        }
    }

    let mut trimmed: Vec<f32> = output.into_iter().skip(pad).take(length).collect();
    trimmed.resize(length, 0.0);
    trimmed
}
