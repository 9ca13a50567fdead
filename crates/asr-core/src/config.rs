//! Конфигурационные структуры для подготовки обучающих данных.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AsrError, AsrResult};

/// Алфавит по умолчанию. Индекс 0 (`_`) зарезервирован под CTC blank.
pub const DEFAULT_ALPHABET: &str = "_'ABCDEFGHIJKLMNOPQRSTUVWXYZ ";

/// Оконная функция для STFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    /// 0.54 - 0.46 cos(...)
    Hamming,
    /// 0.5 - 0.5 cos(...)
    Hann,
    Blackman,
    Bartlett,
    /// Без взвешивания.
    Rectangular,
}

impl WindowType {
    /// Коэффициенты окна длины `length` (симметричное окно).
    pub fn coefficients(self, length: usize) -> Vec<f32> {
        use std::f32::consts::PI;

        if length <= 1 {
            return vec![1.0; length];
        }
        let denom = (length - 1) as f32;
        (0..length)
            .map(|n| {
                let x = n as f32 / denom;
                match self {
                    WindowType::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
                    WindowType::Hann => 0.5 - 0.5 * (2.0 * PI * x).cos(),
                    WindowType::Blackman => {
                        0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
                    }
                    WindowType::Bartlett => 1.0 - (2.0 * x - 1.0).abs(),
                    WindowType::Rectangular => 1.0,
                }
            })
            .collect()
    }
}

/// Конфигурация спектрограммы (линейная шкала частот, без mel-фильтров).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrogramConfig {
    /// Целевая частота дискретизации в Гц.
    pub sample_rate: usize,

    /// Длина окна в секундах.
    pub frame_length: f32,

    /// Шаг между фреймами в секундах.
    pub frame_stride: f32,

    /// Максимальная длительность записи в секундах (всё, что длиннее, обрезается).
    pub max_duration: f32,

    /// Оконная функция.
    pub window: WindowType,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_length: 0.02,
            frame_stride: 0.01,
            max_duration: 15.0,
            window: WindowType::Hamming,
        }
    }
}

impl SpectrogramConfig {
    /// Длина окна в сэмплах (она же размер FFT).
    pub fn frame_samples(&self) -> usize {
        (self.frame_length * self.sample_rate as f32).round() as usize
    }

    /// Шаг между фреймами в сэмплах.
    pub fn stride_samples(&self) -> usize {
        (self.frame_stride * self.sample_rate as f32).round() as usize
    }

    /// Количество частотных бинов: `frame_samples / 2 + 1`.
    pub fn freq_bins(&self) -> usize {
        self.frame_samples() / 2 + 1
    }

    /// Максимальное количество сэмплов в одной записи.
    pub fn max_samples(&self) -> usize {
        (self.max_duration * self.sample_rate as f32).round() as usize
    }

    /// Количество фреймов спектрограммы для записи из `num_samples` сэмплов.
    pub fn frames_for(&self, num_samples: usize) -> usize {
        let frame = self.frame_samples();
        if num_samples < frame {
            return 0;
        }
        (num_samples - frame) / self.stride_samples() + 1
    }

    /// Длина по времени, до которой дополняется каждая спектрограмма батча.
    pub fn max_frames(&self) -> usize {
        self.frames_for(self.max_samples())
    }

    pub fn validate(&self) -> AsrResult<()> {
        if self.sample_rate == 0 {
            return Err(AsrError::Config("sample_rate must be positive".into()));
        }
        if self.frame_samples() < 2 {
            return Err(AsrError::Config(format!(
                "frame_length {}s is shorter than two samples at {} Hz",
                self.frame_length, self.sample_rate
            )));
        }
        if self.stride_samples() == 0 {
            return Err(AsrError::Config(format!(
                "frame_stride {}s rounds to zero samples",
                self.frame_stride
            )));
        }
        if self.stride_samples() > self.frame_samples() {
            return Err(AsrError::Config(format!(
                "frame_stride ({}s) must not exceed frame_length ({}s)",
                self.frame_stride, self.frame_length
            )));
        }
        if self.max_frames() == 0 {
            return Err(AsrError::Config(format!(
                "max_duration {}s is shorter than one frame",
                self.max_duration
            )));
        }
        Ok(())
    }
}

/// Конфигурация кодирования транскрипций.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Алфавит; первый символ играет роль blank.
    pub alphabet: String,

    /// Максимальная длина транскрипции в символах.
    pub max_length: usize,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.to_string(),
            max_length: 1300,
        }
    }
}

impl TranscriptConfig {
    /// Количество выходных классов модели (включая blank).
    pub fn num_classes(&self) -> usize {
        self.alphabet.chars().count()
    }

    pub fn validate(&self) -> AsrResult<()> {
        if self.num_classes() < 2 {
            return Err(AsrError::Config(
                "alphabet must contain a blank and at least one symbol".into(),
            ));
        }
        if self.max_length == 0 {
            return Err(AsrError::Config("max transcript length must be positive".into()));
        }
        Ok(())
    }
}

/// Конфигурация аддитивного шума.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Манифест с путями к шумовым записям. `None` отключает шум.
    pub manifest: Option<PathBuf>,

    /// Вероятность подмешать шум к записи.
    pub probability: f32,

    /// Нижняя граница уровня шума.
    pub level_min: f32,

    /// Верхняя граница уровня шума (1.0 соответствует SNR 0 дБ).
    pub level_max: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            manifest: None,
            probability: 0.4,
            level_min: 0.5,
            level_max: 1.0,
        }
    }
}

impl NoiseConfig {
    pub fn validate(&self) -> AsrResult<()> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(AsrError::Config(format!(
                "noise probability {} is outside [0, 1]",
                self.probability
            )));
        }
        if !(0.0..=1.0).contains(&self.level_min)
            || !(0.0..=1.0).contains(&self.level_max)
            || self.level_min > self.level_max
        {
            return Err(AsrError::Config(format!(
                "noise level range [{}, {}] must be ordered within [0, 1]",
                self.level_min, self.level_max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spectrogram_geometry() {
        let config = SpectrogramConfig::default();
        assert_eq!(config.frame_samples(), 320);
        assert_eq!(config.stride_samples(), 160);
        assert_eq!(config.freq_bins(), 161);
        assert_eq!(config.max_samples(), 240_000);
        assert_eq!(config.max_frames(), 1499);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frames_for_short_audio() {
        let config = SpectrogramConfig::default();
        assert_eq!(config.frames_for(100), 0);
        assert_eq!(config.frames_for(320), 1);
        assert_eq!(config.frames_for(480), 2);
    }

    #[test]
    fn test_stride_longer_than_frame_rejected() {
        let config = SpectrogramConfig {
            frame_stride: 0.05,
            ..SpectrogramConfig::default()
        };
        assert!(matches!(config.validate(), Err(AsrError::Config(_))));
    }

    #[test]
    fn test_default_alphabet() {
        let config = TranscriptConfig::default();
        assert_eq!(config.num_classes(), 29);
        assert!(config.alphabet.starts_with('_'));
    }

    #[test]
    fn test_noise_range_validation() {
        let bad = NoiseConfig {
            level_min: 0.9,
            level_max: 0.1,
            ..NoiseConfig::default()
        };
        assert!(bad.validate().is_err());
        assert!(NoiseConfig::default().validate().is_ok());
    }

    #[test]
    fn test_window_shapes() {
        let hamming = WindowType::Hamming.coefficients(5);
        assert!((hamming[0] - 0.08).abs() < 1e-6);
        assert!((hamming[2] - 1.0).abs() < 1e-6);

        let rect = WindowType::Rectangular.coefficients(4);
        assert!(rect.iter().all(|&w| w == 1.0));

        let bartlett = WindowType::Bartlett.coefficients(5);
        assert_eq!(bartlett[0], 0.0);
        assert!((bartlett[2] - 1.0).abs() < 1e-6);
    }
}
