//! LSB watermark embedding
//!
//! The payload is derived from an identifier: its hex digest is expanded
//! character by character into 8-bit ASCII codes. Samples are quantized to
//! 16-bit integers, the payload bits are written into the least significant
//! bit of samples spaced evenly across the buffer, and everything is scaled
//! back to floating point.
//!
//! LSB marks are fragile: any lossy re-encoding (MP3, AAC, resampling,
//! gain changes) destroys them. Only lossless PCM output keeps the payload.

use crate::audio::SampleBuffer;
use serde::{Deserialize, Serialize};

/// Full-scale value for 16-bit quantization
pub const QUANT_SCALE: f32 = 32767.0;

/// One-way hash used to derive the payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkHash {
    #[default]
    Md5,
}

impl WatermarkHash {
    /// Lowercase hex digest of `input`
    pub fn hex_digest(self, input: &str) -> String {
        match self {
            WatermarkHash::Md5 => format!("{:x}", md5::compute(input.as_bytes())),
        }
    }
}

/// Fixed-length bit sequence derived from an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkPayload {
    bits: Vec<bool>,
}

impl WatermarkPayload {
    pub fn derive(identifier: &str, hash: WatermarkHash) -> Self {
        let digest = hash.hex_digest(identifier);
        let bits = digest
            .bytes()
            .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1 == 1))
            .collect();
        Self { bits }
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

/// Where the payload landed in the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedReport {
    pub stride: usize,
    pub bits_written: usize,
}

/// Sample spacing between payload bits
pub fn stride_for(total_samples: usize, payload_bits: usize) -> usize {
    (total_samples / payload_bits.max(1)).max(1)
}

/// Quantize one sample to 16 bits, truncating toward zero
///
/// Out-of-range input saturates at the i16 limits.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    (sample * QUANT_SCALE) as i16
}

#[inline]
pub fn dequantize(value: i16) -> f32 {
    value as f32 / QUANT_SCALE
}

/// Overwrite the least significant bit of a 16-bit sample
#[inline]
pub fn set_lsb(value: i16, bit: bool) -> i16 {
    (value & !1) | bit as i16
}

/// Embed `payload` into `buffer` in place
///
/// Every sample is requantized, including those that carry no payload bit.
/// Samples are expected in [-1, 1]; callers clamp beforehand.
pub fn embed(buffer: &mut SampleBuffer, payload: &WatermarkPayload) -> EmbedReport {
    let stride = stride_for(buffer.len(), payload.len());

    let mut quantized: Vec<i16> = buffer.samples.iter().map(|&s| quantize(s)).collect();

    let mut bits_written = 0;
    for (slot, &bit) in quantized.iter_mut().step_by(stride).zip(payload.bits()) {
        *slot = set_lsb(*slot, bit);
        bits_written += 1;
    }

    for (sample, &q) in buffer.samples.iter_mut().zip(&quantized) {
        *sample = dequantize(q);
    }

    if bits_written < payload.len() {
        log::warn!(
            "Buffer too short for full watermark: {} of {} bits written",
            bits_written,
            payload.len()
        );
    }
    log::debug!(
        "Watermark embedded: {} bits, stride {} samples",
        bits_written,
        stride
    );

    EmbedReport {
        stride,
        bits_written,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lsbs(buffer: &SampleBuffer, stride: usize, count: usize) -> Vec<bool> {
        buffer
            .samples
            .iter()
            .step_by(stride)
            .take(count)
            .map(|&s| (s * QUANT_SCALE).round() as i16 & 1 == 1)
            .collect()
    }

    fn test_buffer(len: usize) -> SampleBuffer {
        SampleBuffer::new(
            (0..len).map(|i| ((i as f32) * 0.013).sin() * 0.8).collect(),
            22050,
        )
    }

    #[test]
    fn test_payload_is_ascii_bits_of_hex_digest() {
        let payload = WatermarkPayload::derive("track-42", WatermarkHash::Md5);
        assert_eq!(payload.len(), 32 * 8);

        let digest = WatermarkHash::Md5.hex_digest("track-42");
        let first = digest.as_bytes()[0];
        let expected: Vec<bool> = (0..8).rev().map(|s| (first >> s) & 1 == 1).collect();
        assert_eq!(&payload.bits()[..8], expected.as_slice());
        // Hex characters are ASCII: top bit is always clear
        assert!(payload.bits().chunks(8).all(|c| !c[0]));
    }

    #[test]
    fn test_payload_length_independent_of_identifier() {
        let short = WatermarkPayload::derive("a", WatermarkHash::Md5);
        let long = WatermarkPayload::derive(&"x".repeat(10_000), WatermarkHash::Md5);
        assert_eq!(short.len(), long.len());
        assert_ne!(short, long);
    }

    #[test]
    fn test_md5_digest_known_value() {
        assert_eq!(
            WatermarkHash::Md5.hex_digest(""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_set_lsb_keeps_sign() {
        assert_eq!(set_lsb(-3, false), -4);
        assert_eq!(set_lsb(-4, true), -3);
        assert_eq!(set_lsb(i16::MIN, true), i16::MIN + 1);
        assert_eq!(set_lsb(i16::MAX, false), i16::MAX - 1);
        assert_eq!(set_lsb(0, true), 1);
    }

    #[test]
    fn test_quantize_truncates_toward_zero() {
        assert_eq!(quantize(0.5), 16383);
        assert_eq!(quantize(-0.5), -16383);
        assert_eq!(quantize(1.0), 32767);
        assert_eq!(quantize(-1.0), -32767);
        assert_eq!(quantize(2.0), i16::MAX);
    }

    #[test]
    fn test_bits_land_at_stride() {
        let payload = WatermarkPayload::derive("listener-7", WatermarkHash::Md5);
        let mut buffer = test_buffer(10_000);
        let report = embed(&mut buffer, &payload);

        assert_eq!(report.stride, 10_000 / 256);
        assert_eq!(report.bits_written, 256);
        assert_eq!(read_lsbs(&buffer, report.stride, 256), payload.bits());
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let payload = WatermarkPayload::derive("listener-7", WatermarkHash::Md5);
        let mut a = test_buffer(5000);
        let mut b = test_buffer(5000);
        embed(&mut a, &payload);
        embed(&mut b, &payload);
        assert_eq!(a, b);
    }

    #[test]
    fn test_reembedding_overwrites() {
        let first = WatermarkPayload::derive("first", WatermarkHash::Md5);
        let second = WatermarkPayload::derive("second", WatermarkHash::Md5);
        let mut buffer = test_buffer(8192);

        embed(&mut buffer, &first);
        let report = embed(&mut buffer, &second);
        assert_eq!(read_lsbs(&buffer, report.stride, 256), second.bits());
    }

    #[test]
    fn test_unvisited_samples_only_requantized() {
        let payload = WatermarkPayload::derive("id", WatermarkHash::Md5);
        let original = test_buffer(2560);
        let mut buffer = original.clone();
        let report = embed(&mut buffer, &payload);
        assert_eq!(report.stride, 10);

        for (i, (&before, &after)) in original.samples.iter().zip(&buffer.samples).enumerate() {
            if i % report.stride != 0 {
                assert_eq!(after, dequantize(quantize(before)));
            }
            assert!((before - after).abs() <= 2.0 / QUANT_SCALE);
        }
    }

    #[test]
    fn test_short_buffer_writes_partial_payload() {
        let payload = WatermarkPayload::derive("id", WatermarkHash::Md5);
        let mut buffer = test_buffer(100);
        let report = embed(&mut buffer, &payload);
        assert_eq!(report.stride, 1);
        assert_eq!(report.bits_written, 100);
        assert_eq!(read_lsbs(&buffer, 1, 100), &payload.bits()[..100]);
    }
}
