//! Линейная лог-спектрограмма для обучения DeepSpeech.
//!
//! В отличие от mel-экстракторов инференса здесь нет фильтрбанка: модель
//! получает все `n_fft / 2 + 1` бинов амплитудного спектра после `ln(1 + |X|)`.
//! STFT без центрирования: первый фрейм начинается с нулевого сэмпла.

use std::sync::Arc;

use asr_core::SpectrogramConfig;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Спектрограмма одной записи, хранится как `[freq][time]`.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    data: Vec<f32>,
    freq_bins: usize,
    num_frames: usize,
}

impl Spectrogram {
    pub fn freq_bins(&self) -> usize {
        self.freq_bins
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Значение в бине `freq` фрейма `frame`.
    pub fn get(&self, freq: usize, frame: usize) -> f32 {
        self.data[freq * self.num_frames + frame]
    }

    /// Записать спектрограмму в `out` формы `[freq][max_frames]`.
    ///
    /// Фреймы дальше `max_frames` отбрасываются, недостающие заполняются нулями.
    /// Возвращает количество записанных (валидных) фреймов.
    pub fn write_padded(&self, out: &mut [f32], max_frames: usize) -> usize {
        debug_assert_eq!(out.len(), self.freq_bins * max_frames);
        let valid = self.num_frames.min(max_frames);
        for f in 0..self.freq_bins {
            let src = &self.data[f * self.num_frames..f * self.num_frames + valid];
            let dst = &mut out[f * max_frames..(f + 1) * max_frames];
            dst[..valid].copy_from_slice(src);
            dst[valid..].fill(0.0);
        }
        valid
    }
}

/// STFT-экстрактор с настраиваемым окном.
pub struct SpectrogramExtractor {
    config: SpectrogramConfig,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectrogramExtractor {
    pub fn new(config: SpectrogramConfig) -> Self {
        let n_fft = config.frame_samples();
        let window = config.window.coefficients(n_fft);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
        Self {
            config,
            window,
            fft,
        }
    }

    pub fn config(&self) -> &SpectrogramConfig {
        &self.config
    }

    /// Compute the log-magnitude spectrogram of mono samples.
    pub fn extract(&self, samples: &[f32]) -> Spectrogram {
        let n_fft = self.config.frame_samples();
        let hop = self.config.stride_samples();
        let freq_bins = self.config.freq_bins();
        let num_frames = self.config.frames_for(samples.len());

        let mut data = vec![0.0f32; freq_bins * num_frames];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); self.fft.get_inplace_scratch_len()];

        for frame in 0..num_frames {
            let start = frame * hop;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(samples[start + i] * self.window[i], 0.0);
            }
            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            for (f, c) in buffer.iter().take(freq_bins).enumerate() {
                data[f * num_frames + frame] = c.norm().ln_1p();
            }
        }

        Spectrogram {
            data,
            freq_bins,
            num_frames,
        }
    }
}

impl Default for SpectrogramExtractor {
    fn default() -> Self {
        Self::new(SpectrogramConfig::default())
    }
}
