//! Inaudible LSB watermarking and PCM persistence

pub mod codec;
pub mod writer;

pub use codec::{embed, EmbedReport, WatermarkHash, WatermarkPayload};
pub use writer::{write_pcm, BitDepth};
