//! Audio analysis layer
//!
//! Signal analysis goes through the [`SignalAnalysis`] trait so the matrix
//! assembler can be driven by any backend. The built-in backend is
//! [`SpectralAnalyzer`] (rustfft descriptors, stratum-dsp tempo).

pub mod frames;
mod hpss;
pub mod matrix;
mod spectral;
mod stft;
mod tempo;
mod traits;
pub mod waveform;

pub use frames::{fit_table_to_frames, fit_to_frames};
pub use matrix::{assemble, Chroma, FixedFrame};
pub use spectral::SpectralAnalyzer;
pub use traits::{DescriptorKind, DescriptorTable, SignalAnalysis};
pub use waveform::envelope;

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
