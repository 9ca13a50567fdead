//! # asr-core
//!
//! Базовые типы, конфигурации и определения ошибок для обучения RustASR.
//!
//! Этот крейт предоставляет фундаментальные абстракции для всех остальных
//! крейтов в workspace:
//!
//! - Аудио-буфер [`AudioBuffer`]
//! - Конфигурация спектрограммы и транскрипций ([`SpectrogramConfig`], [`TranscriptConfig`])
//! - Унифицированная обработка ошибок через [`AsrError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{NoiseConfig, SpectrogramConfig, TranscriptConfig, WindowType, DEFAULT_ALPHABET};
pub use error::{AsrError, AsrResult};
pub use types::AudioBuffer;
