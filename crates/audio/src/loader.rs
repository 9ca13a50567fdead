//! WAV file loading.

use std::path::Path;

use asr_core::{AsrError, AsrResult, AudioBuffer};
use hound::{SampleFormat, WavReader};

use crate::resample::Resampler;

/// Load a WAV file and return an AudioBuffer.
pub fn load_wav(path: impl AsRef<Path>) -> AsrResult<AudioBuffer> {
    let path = path.as_ref();
    let reader = WavReader::open(path)
        .map_err(|e| AsrError::Audio(format!("Failed to open WAV {:?}: {}", path, e)))?;

    let spec = reader.spec();
    let read_err = |e: hound::Error| AsrError::Audio(format!("Failed to read {:?}: {}", path, e));

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err)?,
        SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(read_err)?
        }
    };

    Ok(AudioBuffer::new(
        samples,
        spec.sample_rate as usize,
        spec.channels as usize,
    ))
}

/// Convert multi-channel audio to mono by averaging channels.
pub fn to_mono(buffer: &AudioBuffer) -> AudioBuffer {
    if buffer.channels <= 1 {
        return buffer.clone();
    }

    let mono: Vec<f32> = buffer
        .samples
        .chunks(buffer.channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    AudioBuffer::new(mono, buffer.sample_rate, 1)
}

/// Загрузить WAV, свести в моно и привести к `sample_rate`.
pub fn load_mono(path: impl AsRef<Path>, sample_rate: usize) -> AsrResult<AudioBuffer> {
    let buffer = to_mono(&load_wav(path)?);
    Resampler::new(sample_rate).resample(&buffer)
}
