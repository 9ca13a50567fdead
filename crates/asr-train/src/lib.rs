//! # asr-train
//!
//! Цикл обучения DeepSpeech с CTC-loss:
//!
//! - [`ctc::ctc_loss`]: CTC в лог-пространстве на тензорных операциях Candle
//! - [`clip::clip_grad_norm`]: клиппинг по глобальной L2-норме градиентов
//! - [`optimizer::SgdMomentum`]: SGD с моментумом
//! - [`meter::AverageMeter`]: текущие и средние значения для прогресса
//! - [`trainer::Trainer`]: эпохи × батчи

pub mod clip;
pub mod ctc;
pub mod meter;
pub mod optimizer;
pub mod trainer;

pub use clip::clip_grad_norm;
pub use ctc::{ctc_loss, CtcLoss};
pub use meter::AverageMeter;
pub use optimizer::{SgdMomentum, SgdMomentumConfig};
pub use trainer::{Trainer, TrainerConfig};
