//! Цикл обучения: эпохи × батчи.
//!
//! Один шаг: reshape спектрограмм → forward → CTC-loss / batch → backward →
//! клиппинг глобальной нормы → шаг SGD → обновление метрик и строка прогресса.

use std::time::Instant;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Optimizer, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use asr_core::{AsrError, AsrResult};
use asr_data::{Batch, BatchSource};
use model_deepspeech::{DeepSpeech, DeepSpeechConfig};

use crate::clip::clip_grad_norm;
use crate::ctc::CtcLoss;
use crate::meter::AverageMeter;
use crate::optimizer::{SgdMomentum, SgdMomentumConfig};

/// Параметры цикла обучения.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Количество эпох.
    pub epochs: usize,

    /// Размер минибатча (фиксирован на всё обучение).
    pub batch_size: usize,

    /// Порог глобальной нормы градиентов.
    pub max_norm: f64,

    pub optimizer: SgdMomentumConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 70,
            batch_size: 20,
            max_norm: 400.0,
            optimizer: SgdMomentumConfig::default(),
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> AsrResult<()> {
        if self.epochs == 0 {
            return Err(AsrError::Config("epochs must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(AsrError::Config("batch_size must be positive".into()));
        }
        if !(self.max_norm > 0.0) {
            return Err(AsrError::Config(format!(
                "max_norm must be positive, got {}",
                self.max_norm
            )));
        }
        if !(self.optimizer.lr > 0.0) || self.optimizer.momentum < 0.0 {
            return Err(AsrError::Config(format!(
                "invalid optimizer settings: lr={}, momentum={}",
                self.optimizer.lr, self.optimizer.momentum
            )));
        }
        Ok(())
    }
}

/// Результат одного шага.
#[derive(Debug, Clone, Copy)]
pub struct StepStats {
    /// Loss, нормированный на размер батча.
    pub loss: f64,
    /// Норма градиентов до клиппинга.
    pub grad_norm: f64,
}

/// Владеет моделью, оптимизатором и метриками на всё время обучения.
pub struct Trainer {
    model: DeepSpeech,
    varmap: VarMap,
    optimizer: SgdMomentum,
    vars: Vec<Var>,
    ctc: CtcLoss,
    hidden: Tensor,
    cell: Tensor,
    device: Device,
    config: TrainerConfig,
    batch_time: AverageMeter,
    data_time: AverageMeter,
    losses: AverageMeter,
}

impl Trainer {
    pub fn new(
        model_config: &DeepSpeechConfig,
        config: TrainerConfig,
        device: &Device,
    ) -> AsrResult<Self> {
        config.validate()?;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = DeepSpeech::new(model_config, vb)?;

        let vars = varmap.all_vars();
        let optimizer = SgdMomentum::new(vars.clone(), config.optimizer)?;
        let (hidden, cell) = model.random_state(config.batch_size, device)?;

        debug!("Trainer: {} тензоров параметров", vars.len());

        Ok(Self {
            model,
            varmap,
            optimizer,
            vars,
            ctc: CtcLoss::default(),
            hidden,
            cell,
            device: device.clone(),
            config,
            batch_time: AverageMeter::new(),
            data_time: AverageMeter::new(),
            losses: AverageMeter::new(),
        })
    }

    pub fn model(&self) -> &DeepSpeech {
        &self.model
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn batch_time(&self) -> &AverageMeter {
        &self.batch_time
    }

    pub fn data_time(&self) -> &AverageMeter {
        &self.data_time
    }

    pub fn losses(&self) -> &AverageMeter {
        &self.losses
    }

    /// Полное обучение: `epochs` эпох по всем батчам источника.
    pub fn train(&mut self, source: &mut dyn BatchSource) -> AsrResult<()> {
        for epoch in 1..=self.config.epochs {
            self.train_epoch(epoch, source)?;
        }
        Ok(())
    }

    /// Одна эпоха. Возвращает средний loss этой эпохи.
    pub fn train_epoch(&mut self, epoch: usize, source: &mut dyn BatchSource) -> AsrResult<f64> {
        source.start_epoch(epoch);
        let num_batches = source.num_batches();
        let mut epoch_loss = AverageMeter::new();
        let epoch_start = Instant::now();

        let mut end = Instant::now();
        let mut index = 0;
        while let Some(batch) = source.next_batch()? {
            self.data_time.update(end.elapsed().as_secs_f64(), 1.0);

            let stats = self.train_step(&batch)?;
            let weight = batch.size() as f64;
            self.losses.update(stats.loss, weight);
            epoch_loss.update(stats.loss, weight);

            self.batch_time.update(end.elapsed().as_secs_f64(), 1.0);
            end = Instant::now();
            index += 1;

            println!(
                "{}",
                format_progress(
                    epoch,
                    index,
                    num_batches,
                    &self.batch_time,
                    &self.data_time,
                    &self.losses
                )
            );
        }

        info!(
            "Эпоха {}: {} батчей за {:.1}с, loss эпохи {:.4}, накопленный {:.4}",
            epoch,
            index,
            epoch_start.elapsed().as_secs_f64(),
            epoch_loss.avg,
            self.losses.avg
        );
        Ok(epoch_loss.avg)
    }

    /// Один шаг оптимизации на батче.
    pub fn train_step(&mut self, batch: &Batch) -> AsrResult<StepStats> {
        let batch_size = batch.size();
        if batch_size != self.config.batch_size {
            return Err(AsrError::Data(format!(
                "expected batch of {}, got {}",
                self.config.batch_size, batch_size
            )));
        }

        let input = reshape_features(
            &batch.features,
            batch_size,
            self.model.config().freq_bins,
            &self.device,
        )?;

        // Свежая отвязанная копия состояний: градиент не течёт между батчами.
        let hidden = self.hidden.detach();
        let cell = self.cell.detach();

        let out = self.model.forward(&input, &hidden, &cell, true)?;
        let max_seq_length = out.dim(0)?;
        let sizes = output_lengths(&batch.valid_fractions, max_seq_length);

        let loss = self
            .ctc
            .forward(&out, &batch.targets, &sizes, &batch.label_lengths)?;
        let loss = normalize_loss(&loss, batch_size)?;
        let loss_value = loss.to_dtype(DType::F64)?.to_scalar::<f64>()?;
        if !loss_value.is_finite() {
            warn!("loss не конечен: {}", loss_value);
        }

        let mut grads = loss.backward()?;
        let grad_norm = clip_grad_norm(&self.vars, &mut grads, self.config.max_norm)?;
        if grad_norm > self.config.max_norm {
            debug!("grad norm {:.2} > {}, клиппинг", grad_norm, self.config.max_norm);
        }
        self.optimizer.step(&grads)?;

        Ok(StepStats {
            loss: loss_value,
            grad_norm,
        })
    }
}

/// Разложить плоский буфер спектрограмм в `(batch, 1, freq, time)`.
///
/// Длина буфера обязана делиться на `batch × freq`; иначе это ошибка данных.
pub fn reshape_features(
    features: &[f32],
    batch: usize,
    freq_bins: usize,
    device: &Device,
) -> AsrResult<Tensor> {
    let per_step = batch * freq_bins;
    if per_step == 0 || features.is_empty() || features.len() % per_step != 0 {
        return Err(AsrError::Data(format!(
            "cannot reshape {} values into ({}, 1, {}, -1)",
            features.len(),
            batch,
            freq_bins
        )));
    }
    let time = features.len() / per_step;
    Ok(Tensor::from_slice(features, (batch, 1, freq_bins, time), device)?)
}

/// Абсолютные длины выходов: доля валидных фреймов × длина выхода модели.
pub fn output_lengths(fractions: &[f32], max_seq_length: usize) -> Vec<usize> {
    fractions
        .iter()
        .map(|&f| {
            let len = (f as f64 * max_seq_length as f64).round();
            len.clamp(0.0, max_seq_length as f64) as usize
        })
        .collect()
}

/// Суммарный loss батча → средний на пример.
pub fn normalize_loss(loss: &Tensor, batch_size: usize) -> candle_core::Result<Tensor> {
    loss.affine(1.0 / batch_size as f64, 0.0)
}

/// Строка прогресса в формате исходного скрипта обучения.
pub fn format_progress(
    epoch: usize,
    index: usize,
    num_batches: usize,
    batch_time: &AverageMeter,
    data_time: &AverageMeter,
    losses: &AverageMeter,
) -> String {
    format!(
        "Epoch: [{}][{}/{}]\tTime {:.3} ({:.3})\tData {:.3} ({:.3})\tLoss {:.4} ({:.4})\t",
        epoch,
        index,
        num_batches,
        batch_time.val,
        batch_time.avg,
        data_time.val,
        data_time.avg,
        losses.val,
        losses.avg
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_lengths_from_fractions() {
        assert_eq!(output_lengths(&[0.8, 1.0], 100), vec![80, 100]);
        assert_eq!(output_lengths(&[0.0, 0.333], 3), vec![0, 1]);
        assert_eq!(output_lengths(&[1.2], 10), vec![10]);
    }

    #[test]
    fn test_loss_normalised_by_batch() {
        let raw = Tensor::new(40f32, &Device::Cpu).unwrap();
        let loss = normalize_loss(&raw, 20).unwrap();
        assert!((loss.to_scalar::<f32>().unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_reshape_features() {
        let features: Vec<f32> = (0..2 * 3 * 4).map(|v| v as f32).collect();
        let input = reshape_features(&features, 2, 3, &Device::Cpu).unwrap();
        assert_eq!(input.dims(), &[2, 1, 3, 4]);
        // Второй пример, частота 1, фрейм 2.
        let v: f32 = input.get(1).unwrap().get(0).unwrap().get(1).unwrap().get(2).unwrap()
            .to_scalar().unwrap();
        assert_eq!(v, (12 + 4 + 2) as f32);
    }

    #[test]
    fn test_reshape_rejects_ragged_buffer() {
        let features = vec![0.0f32; 2 * 3 * 4 + 1];
        let err = reshape_features(&features, 2, 3, &Device::Cpu).unwrap_err();
        assert!(matches!(err, AsrError::Data(_)));
        assert!(reshape_features(&[], 2, 3, &Device::Cpu).is_err());
    }

    #[test]
    fn test_progress_line_format() {
        let mut bt = AverageMeter::new();
        let mut dt = AverageMeter::new();
        let mut losses = AverageMeter::new();
        bt.update(1.5, 1.0);
        dt.update(0.25, 1.0);
        losses.update(2.0, 20.0);
        assert_eq!(
            format_progress(3, 7, 10, &bt, &dt, &losses),
            "Epoch: [3][7/10]\tTime 1.500 (1.500)\tData 0.250 (0.250)\tLoss 2.0000 (2.0000)\t"
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TrainerConfig {
            max_norm: 0.0,
            ..TrainerConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(TrainerConfig::default().validate().is_ok());
    }
}
