//! Audio file decoding and sample-rate conversion
//!
//! symphonia demuxes and decodes the first audio track; channels are averaged
//! to mono packet by packet. Rate conversion goes through rubato's FFT
//! resampler, which band-limits to the output Nyquist before decimating.

use super::SampleBuffer;
use crate::error::AnalysisError;
use anyhow::{Context, Result};
use rubato::{FftFixedInOut, Resampler};
use std::path::Path;
use symphonia::core::audio::{SampleBuffer as PcmBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Input frames per resampler block
const RESAMPLE_CHUNK: usize = 1024;

/// Load an audio file as a mono buffer
///
/// When `target_rate` is set and differs from the file's native rate, the
/// result is resampled to it.
pub fn load(path: &Path, target_rate: Option<u32>) -> Result<SampleBuffer> {
    let mut reader = TrackReader::open(path)?;
    let native_rate = reader.sample_rate;
    let samples = reader.read_mono()?;

    if samples.is_empty() {
        return Err(AnalysisError::EmptyBuffer).with_context(|| format!("{:?}", path));
    }

    match target_rate {
        Some(rate) if rate != native_rate => {
            log::debug!("Resampling {}Hz -> {}Hz", native_rate, rate);
            let resampled = resample(&samples, native_rate, rate)
                .with_context(|| format!("Failed to resample {:?}", path))?;
            Ok(SampleBuffer::new(resampled, rate))
        }
        _ => Ok(SampleBuffer::new(samples, native_rate)),
    }
}

/// First audio track of a container plus its decoder
struct TrackReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
}

impl TrackReader {
    fn open(path: &Path) -> Result<Self, AnalysisError> {
        let file = std::fs::File::open(path).map_err(|e| AnalysisError::io(path, e))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let format = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AnalysisError::Decode(format!("{:?}: {}", path, e)))?
            .format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AnalysisError::Decode(format!("No audio track in {:?}", path)))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .filter(|&rate| rate > 0)
            .ok_or_else(|| AnalysisError::Decode(format!("No sample rate in {:?}", path)))?;

        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AnalysisError::Decode(format!("Unsupported codec: {}", e)))?;

        Ok(Self {
            track_id,
            sample_rate,
            format,
            decoder,
        })
    }

    /// Next packet of our track, `None` at end of stream
    fn next_packet(&mut self) -> Result<Option<Packet>, AnalysisError> {
        loop {
            match self.format.next_packet() {
                Ok(packet) if packet.track_id() == self.track_id => return Ok(Some(packet)),
                Ok(_) => continue,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None)
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(AnalysisError::Decode(format!("Corrupt stream: {}", e))),
            }
        }
    }

    /// Decode every packet, averaging channels
    ///
    /// Packets the codec rejects as malformed are skipped; any other failure
    /// aborts the read.
    fn read_mono(&mut self) -> Result<Vec<f32>, AnalysisError> {
        let mut mono = Vec::new();
        let mut pcm: Option<(u64, SignalSpec, PcmBuffer<f32>)> = None;
        let (mut decoded, mut skipped) = (0usize, 0usize);

        while let Some(packet) = self.next_packet()? {
            let audio = match self.decoder.decode(&packet) {
                Ok(audio) => audio,
                Err(SymphoniaError::DecodeError(msg)) => {
                    log::debug!("Skipping malformed packet: {}", msg);
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(AnalysisError::Decode(e.to_string())),
            };

            let spec = *audio.spec();
            let frames = audio.capacity() as u64;
            let (cap, cached_spec, mut buf) = match pcm.take() {
                Some((cap, cached, buf)) if cap >= frames && cached == spec => (cap, cached, buf),
                _ => (frames, spec, PcmBuffer::new(frames, spec)),
            };
            buf.copy_interleaved_ref(audio);
            downmix_into(buf.samples(), spec.channels.count(), &mut mono);
            pcm = Some((cap, cached_spec, buf));
            decoded += 1;
        }

        if skipped > 0 {
            log::warn!("{} of {} packets could not be decoded", skipped, decoded + skipped);
        }
        log::debug!(
            "Decoded {} samples ({:.1}s) at {}Hz",
            mono.len(),
            mono.len() as f32 / self.sample_rate as f32,
            self.sample_rate
        );
        Ok(mono)
    }
}

/// Append the channel average of each interleaved frame
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

/// Band-limited conversion of a mono signal between sample rates
///
/// The output holds `ceil(len * to / from)` samples aligned with the input;
/// the resampler's group delay is trimmed.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AnalysisError::Config(format!(
            "Cannot resample {}Hz -> {}Hz",
            from_rate, to_rate
        ))
        .into());
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 1)
            .map_err(|e| AnalysisError::Computation(format!("Resampler setup failed: {}", e)))?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;

    let mut output = Vec::with_capacity(expected + delay + resampler.output_frames_max());
    let mut block = Vec::with_capacity(resampler.input_frames_max());
    let mut pos = 0;

    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        let start = pos.min(samples.len());
        let end = (pos + needed).min(samples.len());
        block.clear();
        block.extend_from_slice(&samples[start..end]);
        block.resize(needed, 0.0);

        let frames = resampler
            .process(std::slice::from_ref(&block), None)
            .map_err(|e| AnalysisError::Computation(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&frames[0]);
        pos += needed;
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}
