//! DeepSpeech: свёрточный фронтенд + стек LSTM + линейная проекция на алфавит.
//!
//! Модель обучается с нуля: параметры создаются в `VarMap` и обновляются
//! оптимизатором, выход не нормализован (log_softmax применяет CTC-loss).

pub mod config;
pub mod model;

pub use config::DeepSpeechConfig;
pub use model::DeepSpeech;
