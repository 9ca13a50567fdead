//! # audio
//!
//! Audio processing module for RustASR training.
//!
//! This crate handles:
//! - WAV file loading and mono down-mix
//! - Audio resampling to the training sample rate
//! - Linear-frequency log spectrogram extraction
//! - Additive noise augmentation

pub mod loader;
pub mod noise;
pub mod resample;
pub mod spectrogram;

pub use loader::{load_mono, load_wav, to_mono};
pub use noise::NoiseMixer;
pub use resample::Resampler;
pub use spectrogram::{Spectrogram, SpectrogramExtractor};
