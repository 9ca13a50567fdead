//! Аргументы командной строки и сборка конфигураций из них.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use asr_core::{NoiseConfig, SpectrogramConfig, TranscriptConfig, WindowType, DEFAULT_ALPHABET};
use asr_data::DataLoaderConfig;
use asr_train::{SgdMomentumConfig, TrainerConfig};
use model_deepspeech::DeepSpeechConfig;

/// Оконная функция STFT.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowArg {
    Hamming,
    Hann,
    Blackman,
    Bartlett,
    Rectangular,
}

impl From<WindowArg> for WindowType {
    fn from(v: WindowArg) -> Self {
        match v {
            WindowArg::Hamming => WindowType::Hamming,
            WindowArg::Hann => WindowType::Hann,
            WindowArg::Blackman => WindowType::Blackman,
            WindowArg::Bartlett => WindowType::Bartlett,
            WindowArg::Rectangular => WindowType::Rectangular,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rustasr-train")]
#[command(author, version, about = "DeepSpeech training with CTC loss", long_about = None)]
pub struct Args {
    /// Манифест шумовых записей (по одному пути в строке)
    #[arg(long, alias = "noise_manifest", default_value = "noise_manifest.csv")]
    pub noise_manifest: PathBuf,

    /// Обучающий манифест: `путь_к_wav,транскрипция`
    #[arg(long, alias = "train_manifest", default_value = "train_manifest.csv")]
    pub train_manifest: PathBuf,

    /// Sample rate (Hz)
    #[arg(long, alias = "sample_rate", default_value_t = 16000)]
    pub sample_rate: usize,

    #[arg(long, alias = "batch_size", default_value_t = 20)]
    pub batch_size: usize,

    /// Максимальная длина транскрипции (символов)
    #[arg(long, alias = "max_transcript_length", default_value_t = 1300)]
    pub max_transcript_length: usize,

    /// Длина окна STFT в секундах
    #[arg(long, alias = "frame_length", default_value_t = 0.02)]
    pub frame_length: f32,

    /// Шаг окна STFT в секундах
    #[arg(long, alias = "frame_stride", default_value_t = 0.01)]
    pub frame_stride: f32,

    /// Максимальная длительность записи в секундах
    #[arg(long, alias = "max_duration", default_value_t = 15.0)]
    pub max_duration: f32,

    #[arg(long, value_enum, default_value = "hamming")]
    pub window: WindowArg,

    /// Вероятность подмешать шум к записи
    #[arg(long, alias = "noise_probability", default_value_t = 0.4)]
    pub noise_probability: f32,

    /// Minimum noise level (1.0 = 0 dB SNR)
    #[arg(long, alias = "noise_min", default_value_t = 0.5)]
    pub noise_min: f32,

    /// Maximum noise level (1.0 = 0 dB SNR)
    #[arg(long, alias = "noise_max", default_value_t = 1.0)]
    pub noise_max: f32,

    /// Размер скрытого состояния LSTM
    #[arg(long, alias = "hidden_size", default_value_t = 200)]
    pub hidden_size: usize,

    /// Количество слоёв LSTM
    #[arg(long, alias = "hidden_layers", default_value_t = 2)]
    pub hidden_layers: usize,

    #[arg(long, default_value_t = 70)]
    pub epochs: usize,

    /// Обучать на CUDA, если доступна (`--cuda false`: всегда CPU)
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub cuda: bool,

    #[arg(long, alias = "learning-rate", alias = "learning_rate", default_value_t = 3e-4)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,

    /// Порог глобальной нормы градиентов
    #[arg(long, alias = "max_norm", default_value_t = 400.0)]
    pub max_norm: f64,

    /// Перемешивать манифест в начале каждой эпохи
    #[arg(long, default_value_t = false)]
    pub shuffle: bool,

    /// Seed для шума и перемешивания
    #[arg(long, default_value_t = 123456)]
    pub seed: u64,
}

impl Args {
    pub fn spectrogram_config(&self) -> SpectrogramConfig {
        SpectrogramConfig {
            sample_rate: self.sample_rate,
            frame_length: self.frame_length,
            frame_stride: self.frame_stride,
            max_duration: self.max_duration,
            window: self.window.into(),
        }
    }

    pub fn data_config(&self) -> DataLoaderConfig {
        // При нулевой вероятности манифест шума не нужен.
        let manifest = (self.noise_probability > 0.0).then(|| self.noise_manifest.clone());
        DataLoaderConfig {
            manifest: self.train_manifest.clone(),
            batch_size: self.batch_size,
            spectrogram: self.spectrogram_config(),
            transcript: TranscriptConfig {
                alphabet: DEFAULT_ALPHABET.to_string(),
                max_length: self.max_transcript_length,
            },
            noise: NoiseConfig {
                manifest,
                probability: self.noise_probability,
                level_min: self.noise_min,
                level_max: self.noise_max,
            },
            shuffle: self.shuffle,
            seed: self.seed,
        }
    }

    pub fn model_config(&self) -> DeepSpeechConfig {
        DeepSpeechConfig {
            freq_bins: self.spectrogram_config().freq_bins(),
            hidden_size: self.hidden_size,
            hidden_layers: self.hidden_layers,
            num_classes: DEFAULT_ALPHABET.chars().count(),
            ..DeepSpeechConfig::default()
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            max_norm: self.max_norm,
            optimizer: SgdMomentumConfig {
                lr: self.lr,
                momentum: self.momentum,
            },
        }
    }
}
