//! Audio resampling.

use asr_core::{AsrError, AsrResult, AudioBuffer};
use rubato::{FftFixedInOut, Resampler as _};
use tracing::debug;

/// Block size fed to the FFT resampler.
const CHUNK: usize = 1024;

/// Converts mono audio to a fixed target sample rate.
pub struct Resampler {
    target_sample_rate: usize,
}

impl Resampler {
    pub fn new(target_sample_rate: usize) -> Self {
        Self { target_sample_rate }
    }

    pub fn target_sample_rate(&self) -> usize {
        self.target_sample_rate
    }

    /// Resample a mono buffer. Buffers already at the target rate are returned as-is.
    pub fn resample(&self, buffer: &AudioBuffer) -> AsrResult<AudioBuffer> {
        if buffer.sample_rate == self.target_sample_rate {
            return Ok(buffer.clone());
        }
        if buffer.channels != 1 {
            return Err(AsrError::Audio(format!(
                "resampling expects mono audio, got {} channels",
                buffer.channels
            )));
        }

        debug!(
            "resampling {} samples: {} Hz -> {} Hz",
            buffer.samples.len(),
            buffer.sample_rate,
            self.target_sample_rate
        );

        let mut engine =
            FftFixedInOut::<f32>::new(buffer.sample_rate, self.target_sample_rate, CHUNK, 1)
                .map_err(|e| AsrError::Audio(format!("Failed to create resampler: {}", e)))?;

        let in_len = engine.input_frames_next();
        let ratio = self.target_sample_rate as f64 / buffer.sample_rate as f64;
        let expected = (buffer.samples.len() as f64 * ratio).round() as usize;
        let mut output = Vec::with_capacity(expected + in_len);

        // Последний блок дополняется нулями, лишний хвост отрезается по `expected`.
        for block in buffer.samples.chunks(in_len) {
            let mut chunk = block.to_vec();
            chunk.resize(in_len, 0.0);
            let input = vec![chunk];
            let out = engine
                .process(&input, None)
                .map_err(|e| AsrError::Audio(format!("Resampling failed: {}", e)))?;
            output.extend_from_slice(&out[0]);
        }
        output.truncate(expected);

        Ok(AudioBuffer::new(output, self.target_sample_rate, 1))
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new(16000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampler_no_change() {
        let buffer = AudioBuffer::new(vec![0.0; 1024], 16000, 1);
        let result = Resampler::new(16000).resample(&buffer).unwrap();

        assert_eq!(result.sample_rate, 16000);
        assert_eq!(result.samples.len(), buffer.samples.len());
    }

    #[test]
    fn test_resampler_halves_length() {
        let buffer = AudioBuffer::new(vec![0.25; 32000], 32000, 1);
        let result = Resampler::new(16000).resample(&buffer).unwrap();

        assert_eq!(result.sample_rate, 16000);
        assert_eq!(result.samples.len(), 16000);
    }

    #[test]
    fn test_resampler_rejects_stereo() {
        let buffer = AudioBuffer::new(vec![0.0; 64], 8000, 2);
        assert!(Resampler::new(16000).resample(&buffer).is_err());
    }
}
