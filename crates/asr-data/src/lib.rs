//! # asr-data
//!
//! Потоковая загрузка обучающих данных: манифест → аудио → спектрограммы → батчи.
//!
//! - [`Manifest`]: пары «аудио, транскрипция» из CSV-манифеста
//! - [`Alphabet`]: кодирование транскрипций в индексы классов CTC
//! - [`DataLoader`]: батчи фиксированного размера с шумовой аугментацией
//! - [`BatchSource`]: источник батчей для цикла обучения

pub mod alphabet;
pub mod batch;
pub mod loader;
pub mod manifest;

pub use alphabet::Alphabet;
pub use batch::{Batch, BatchSource, VecBatchSource};
pub use loader::{DataLoader, DataLoaderConfig};
pub use manifest::{Manifest, ManifestEntry};
