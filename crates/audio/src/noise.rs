//! Аддитивный шум для аугментации обучающих записей.

use asr_core::{AsrError, AsrResult, AudioBuffer};
use rand::Rng;

/// Подмешивает случайный шумовой клип с заданной вероятностью.
#[derive(Debug, Clone)]
pub struct NoiseMixer {
    clips: Vec<AudioBuffer>,
    probability: f32,
    level_min: f32,
    level_max: f32,
}

impl NoiseMixer {
    /// Clips must already be mono at the training sample rate.
    pub fn new(
        clips: Vec<AudioBuffer>,
        probability: f32,
        level_min: f32,
        level_max: f32,
    ) -> AsrResult<Self> {
        if clips.iter().any(|c| c.channels != 1) {
            return Err(AsrError::Audio("noise clips must be mono".into()));
        }
        let clips: Vec<AudioBuffer> = clips.into_iter().filter(|c| c.rms() > 0.0).collect();
        Ok(Self {
            clips,
            probability,
            level_min,
            level_max,
        })
    }

    pub fn num_clips(&self) -> usize {
        self.clips.len()
    }

    /// Возможно подмешать шум к `samples`. Возвращает применённый уровень.
    pub fn apply<R: Rng + ?Sized>(&self, samples: &mut [f32], rng: &mut R) -> Option<f32> {
        if self.clips.is_empty() || samples.is_empty() || self.probability <= 0.0 {
            return None;
        }
        if rng.gen::<f32>() >= self.probability {
            return None;
        }

        let clip = &self.clips[rng.gen_range(0..self.clips.len())];
        let level = if self.level_max > self.level_min {
            rng.gen_range(self.level_min..=self.level_max)
        } else {
            self.level_min
        };
        let offset = rng.gen_range(0..clip.samples.len());
        mix_at_level(samples, &clip.samples, level, offset);
        Some(level)
    }
}

/// Mix `noise` into `signal` so that its RMS equals `level` times the signal RMS.
///
/// `level = 1.0` gives an SNR of 0 dB. The noise is tiled from `offset` when
/// shorter than the signal. Silent signals and silent noise are left untouched.
pub fn mix_at_level(signal: &mut [f32], noise: &[f32], level: f32, offset: usize) {
    if noise.is_empty() || level <= 0.0 {
        return;
    }
    let signal_rms = rms(signal);
    let noise_rms = rms(noise);
    if signal_rms == 0.0 || noise_rms == 0.0 {
        return;
    }

    let gain = level * signal_rms / noise_rms;
    for (i, s) in signal.iter_mut().enumerate() {
        *s += gain * noise[(offset + i) % noise.len()];
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (energy / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_unit_level_matches_signal_rms() {
        let mut signal = vec![0.5f32; 1000];
        let noise: Vec<f32> = (0..250).map(|i| if i % 2 == 0 { 0.1 } else { -0.1 }).collect();

        mix_at_level(&mut signal, &noise, 1.0, 0);

        // Добавленная компонента должна иметь RMS исходного сигнала (0.5).
        let added: Vec<f32> = signal.iter().map(|s| s - 0.5).collect();
        assert!((rms(&added) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_silent_signal_untouched() {
        let mut signal = vec![0.0f32; 16];
        mix_at_level(&mut signal, &[0.3, -0.3], 1.0, 0);
        assert!(signal.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_probability_zero_never_mixes() {
        let clip = AudioBuffer::new(vec![0.2, -0.2, 0.1], 16000, 1);
        let mixer = NoiseMixer::new(vec![clip], 0.0, 0.5, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut signal = vec![0.3f32; 32];
        assert!(mixer.apply(&mut signal, &mut rng).is_none());
        assert!(signal.iter().all(|&s| s == 0.3));
    }

    #[test]
    fn test_probability_one_level_in_range() {
        let clip = AudioBuffer::new(vec![0.2, -0.2, 0.1, -0.1], 16000, 1);
        let mixer = NoiseMixer::new(vec![clip], 1.0, 0.5, 0.75).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let mut signal = vec![0.3f32; 64];
            let level = mixer.apply(&mut signal, &mut rng).unwrap();
            assert!((0.5..=0.75).contains(&level));
            assert!(signal.iter().any(|&s| s != 0.3));
        }
    }

    #[test]
    fn test_silent_clips_dropped() {
        let silent = AudioBuffer::new(vec![0.0; 8], 16000, 1);
        let mixer = NoiseMixer::new(vec![silent], 1.0, 0.5, 1.0).unwrap();
        assert_eq!(mixer.num_clips(), 0);
    }
}
