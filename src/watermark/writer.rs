//! PCM WAV writer for watermarked audio
//!
//! Output is always a mono integer-PCM WAV, whatever the original container
//! was. At 16 bits the samples are written as `round(s * 32767)`, which
//! reproduces the watermark's quantized integers exactly.

use crate::audio::SampleBuffer;
use crate::error::AnalysisError;
use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Integer PCM bit depth of the persisted file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum BitDepth {
    #[default]
    Pcm16,
    Pcm24,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Pcm16 => 16,
            BitDepth::Pcm24 => 24,
        }
    }

    fn full_scale(self) -> f32 {
        match self {
            BitDepth::Pcm16 => 32767.0,
            BitDepth::Pcm24 => 8_388_607.0,
        }
    }

    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            16 => Some(BitDepth::Pcm16),
            24 => Some(BitDepth::Pcm24),
            _ => None,
        }
    }
}

/// Write `buffer` to `path` as mono PCM, replacing any existing file
pub fn write_pcm(path: &Path, buffer: &SampleBuffer, depth: BitDepth) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate,
        bits_per_sample: depth.bits(),
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(|e| hound_error(path, e))?;
    let scale = depth.full_scale();

    for &sample in &buffer.samples {
        let value = (sample.clamp(-1.0, 1.0) * scale).round();
        match depth {
            BitDepth::Pcm16 => writer.write_sample(value as i16),
            BitDepth::Pcm24 => writer.write_sample(value as i32),
        }
        .map_err(|e| hound_error(path, e))?;
    }

    writer
        .finalize()
        .map_err(|e| hound_error(path, e))
        .with_context(|| format!("Failed to finalize {:?}", path))?;

    log::info!(
        "Wrote {} samples ({}-bit PCM, {}Hz) to {:?}",
        buffer.len(),
        depth.bits(),
        buffer.sample_rate,
        path
    );
    Ok(())
}

impl TryFrom<u16> for BitDepth {
    type Error = AnalysisError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        Self::from_bits(bits).ok_or_else(|| {
            AnalysisError::Config(format!("unsupported output bit depth {} (use 16 or 24)", bits))
        })
    }
}

impl From<BitDepth> for u16 {
    fn from(depth: BitDepth) -> u16 {
        depth.bits()
    }
}

fn hound_error(path: &Path, err: hound::Error) -> AnalysisError {
    match err {
        hound::Error::IoError(e) => AnalysisError::io(path, e),
        other => AnalysisError::Computation(format!("WAV encoding failed: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::codec::dequantize;
    use tempfile::TempDir;

    #[test]
    fn test_16_bit_write_preserves_quantized_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.wav");
        let ints: Vec<i16> = vec![0, 1, -1, 12345, -32767, 32767, 7];
        let buffer = SampleBuffer::new(ints.iter().map(|&q| dequantize(q)).collect(), 22050);

        write_pcm(&path, &buffer, BitDepth::Pcm16).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.spec().bits_per_sample, 16);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, ints);
    }

    #[test]
    fn test_24_bit_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out24.wav");
        let buffer = SampleBuffer::new(vec![0.0, 0.5, -1.0], 44100);

        write_pcm(&path, &buffer, BitDepth::Pcm24).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 24);
        let read: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        assert_eq!(read, vec![0, 4_194_304, -8_388_607]);
    }

    #[test]
    fn test_unwritable_path_is_io_error() {
        let buffer = SampleBuffer::new(vec![0.0; 10], 8000);
        let err = write_pcm(
            Path::new("/nonexistent/dir/out.wav"),
            &buffer,
            BitDepth::Pcm16,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::Io { .. })
        ));
    }

    #[test]
    fn test_bit_depth_from_bits() {
        assert_eq!(BitDepth::from_bits(16), Some(BitDepth::Pcm16));
        assert_eq!(BitDepth::from_bits(24), Some(BitDepth::Pcm24));
        assert_eq!(BitDepth::from_bits(8), None);
    }
}
