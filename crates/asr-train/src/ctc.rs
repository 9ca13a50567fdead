//! CTC-loss (Connectionist Temporal Classification).
//!
//! Прямой проход алгоритма forward (alpha) в лог-пространстве, собранный из
//! дифференцируемых операций Candle: `loss.backward()` даёт градиенты по
//! активациям модели без отдельной реализации backward.
//!
//! Соглашения (как у warp-ctc):
//! - активации `(time, batch, classes)` без нормализации, log_softmax внутри;
//! - метки всех примеров подряд, длины задаются `label_lengths`;
//! - результат: сумма отрицательных лог-правдоподобий по батчу.

use candle_core::{Device, Tensor, D};
use tracing::warn;

use asr_core::{AsrError, AsrResult};

/// Лог-вероятность недостижимого состояния. Конечна, чтобы не получать NaN в logsumexp.
const LOG_ZERO: f32 = -1e30;

/// Параметры CTC-loss.
#[derive(Debug, Clone, Copy)]
pub struct CtcLoss {
    /// Индекс blank-класса.
    pub blank: u32,

    /// Недостижимые выравнивания дают 0 вместо ошибки.
    pub zero_infinity: bool,
}

impl Default for CtcLoss {
    fn default() -> Self {
        Self {
            blank: 0,
            zero_infinity: true,
        }
    }
}

/// CTC-loss с blank = 0 и `zero_infinity`.
pub fn ctc_loss(
    activations: &Tensor,
    targets: &[u32],
    output_lengths: &[usize],
    label_lengths: &[usize],
) -> AsrResult<Tensor> {
    CtcLoss::default().forward(activations, targets, output_lengths, label_lengths)
}

impl CtcLoss {
    /// Суммарный loss по батчу (скалярный тензор).
    pub fn forward(
        &self,
        activations: &Tensor,
        targets: &[u32],
        output_lengths: &[usize],
        label_lengths: &[usize],
    ) -> AsrResult<Tensor> {
        let (max_time, batch, classes) = activations.dims3()?;
        self.validate(max_time, batch, classes, targets, output_lengths, label_lengths)?;

        let mut examples = Vec::with_capacity(batch);
        let mut offset = 0;
        for b in 0..batch {
            let labels = &targets[offset..offset + label_lengths[b]];
            offset += label_lengths[b];

            let time = output_lengths[b];
            let required = min_frames(labels);
            if time == 0 || time < required {
                if self.zero_infinity {
                    warn!(
                        "CTC: пример {} недостижим ({} фреймов < {} требуется), loss = 0",
                        b, time, required
                    );
                    continue;
                }
                return Err(AsrError::Training(format!(
                    "CTC: example {} needs {} frames but has {}",
                    b, required, time
                )));
            }
            examples.push((b, labels));
        }

        if examples.is_empty() {
            // Ни одного достижимого примера: нулевой loss, но привязанный к графу.
            return Ok(activations.sum_all()?.affine(0.0, 0.0)?);
        }

        let device = activations.device();
        let time = examples
            .iter()
            .map(|&(b, _)| output_lengths[b])
            .max()
            .unwrap_or(max_time);
        let batch_ids: Vec<u32> = examples.iter().map(|&(b, _)| b as u32).collect();
        let batch_ids = Tensor::new(batch_ids.as_slice(), device)?;

        // (time, examples, classes), только достижимые примеры.
        let log_probs = candle_nn::ops::log_softmax(&activations.narrow(0, 0, time)?, D::Minus1)?
            .contiguous()?
            .index_select(&batch_ids, 1)?;

        let labels: Vec<&[u32]> = examples.iter().map(|&(_, l)| l).collect();
        let lengths: Vec<usize> = examples.iter().map(|&(b, _)| output_lengths[b]).collect();
        let nll = self.batch_nll(&log_probs, &labels, &lengths, device)?;
        Ok(nll.sum_all()?)
    }

    /// −log p(labels | example) для каждого примера, `log_probs` имеет форму
    /// `(time, batch, classes)`. Рекурсия alpha идёт сразу по всему батчу:
    /// расширенные метки дополнены до общей длины, лишние состояния
    /// недостижимы для настоящих (переходы только s-1 → s и s-2 → s).
    fn batch_nll(
        &self,
        log_probs: &Tensor,
        labels: &[&[u32]],
        lengths: &[usize],
        device: &Device,
    ) -> AsrResult<Tensor> {
        let (time, batch, _) = log_probs.dims3()?;
        let exts: Vec<Vec<u32>> = labels.iter().map(|l| self.extend_with_blanks(l)).collect();
        let states = exts.iter().map(Vec::len).max().unwrap_or(1);

        let mut ids = Vec::with_capacity(batch * states);
        let mut init = Vec::with_capacity(batch * states);
        let mut skip = Vec::with_capacity(batch * states);
        let mut tail_ids = Vec::with_capacity(2 * batch);
        let mut tail_mask = Vec::with_capacity(2 * batch);
        for ext in &exts {
            let len = ext.len();
            for s in 0..states {
                let valid = s < len;
                ids.push(if valid { ext[s] } else { self.blank });
                init.push(if valid && s < 2 { 0.0 } else { LOG_ZERO });
                let can_skip = valid && s >= 2 && ext[s] != self.blank && ext[s] != ext[s - 2];
                skip.push(if can_skip { 0.0 } else { LOG_ZERO });
            }
            // Путь заканчивается последним blank или последней меткой.
            tail_ids.push((len - 1) as u32);
            tail_ids.push(len.saturating_sub(2) as u32);
            tail_mask.push(0.0f32);
            tail_mask.push(if len >= 2 { 0.0 } else { LOG_ZERO });
        }

        // (time, batch, states): лог-вероятность символа каждого состояния.
        let index = Tensor::from_vec(ids, (1, batch, states), device)?
            .broadcast_as((time, batch, states))?
            .contiguous()?;
        let emissions = log_probs.gather(&index, 2)?;

        let init = Tensor::from_vec(init, (batch, states), device)?;
        let skip = Tensor::from_vec(skip, (batch, states), device)?;
        let shortest = lengths.iter().copied().min().unwrap_or(time);

        let mut alpha = emissions.get(0)?.add(&init)?;
        for t in 1..time {
            let mut candidates = vec![alpha.clone(), shift_right(&alpha, 1)?];
            if states > 2 {
                candidates.push(shift_right(&alpha, 2)?.add(&skip)?);
            }
            let stacked = Tensor::stack(&candidates, 0)?;
            let next = logsumexp(&stacked, 0)?.add(&emissions.get(t)?)?;
            alpha = if t < shortest {
                next
            } else {
                // Закончившиеся примеры сохраняют alpha последнего своего фрейма.
                let active: Vec<u8> = lengths.iter().map(|&len| u8::from(t < len)).collect();
                Tensor::from_vec(active, (batch, 1), device)?
                    .broadcast_as((batch, states))?
                    .contiguous()?
                    .where_cond(&next, &alpha)?
            };
        }

        let tail_ids = Tensor::from_vec(tail_ids, (batch, 2), device)?;
        let tail_mask = Tensor::from_vec(tail_mask, (batch, 2), device)?;
        let tail = alpha.contiguous()?.gather(&tail_ids, 1)?.add(&tail_mask)?;
        Ok(logsumexp(&tail, 1)?.neg()?)
    }

    /// `[b, l1, b, l2, ..., lU, b]`.
    fn extend_with_blanks(&self, labels: &[u32]) -> Vec<u32> {
        let mut ext = Vec::with_capacity(2 * labels.len() + 1);
        ext.push(self.blank);
        for &l in labels {
            ext.push(l);
            ext.push(self.blank);
        }
        ext
    }

    fn validate(
        &self,
        max_time: usize,
        batch: usize,
        classes: usize,
        targets: &[u32],
        output_lengths: &[usize],
        label_lengths: &[usize],
    ) -> AsrResult<()> {
        if output_lengths.len() != batch || label_lengths.len() != batch {
            return Err(AsrError::Training(format!(
                "CTC: batch of {} but {} output lengths and {} label lengths",
                batch,
                output_lengths.len(),
                label_lengths.len()
            )));
        }
        let total: usize = label_lengths.iter().sum();
        if total != targets.len() {
            return Err(AsrError::Training(format!(
                "CTC: label lengths sum to {} but {} targets given",
                total,
                targets.len()
            )));
        }
        if let Some(&len) = output_lengths.iter().find(|&&len| len > max_time) {
            return Err(AsrError::Training(format!(
                "CTC: output length {} exceeds {} frames",
                len, max_time
            )));
        }
        if let Some(&bad) = targets
            .iter()
            .find(|&&l| l == self.blank || l as usize >= classes)
        {
            return Err(AsrError::Training(format!(
                "CTC: label {} is blank or outside {} classes",
                bad, classes
            )));
        }
        Ok(())
    }
}

/// Minimum frames to emit `labels`: one per label plus a blank between repeats.
pub fn min_frames(labels: &[u32]) -> usize {
    let repeats = labels.windows(2).filter(|w| w[0] == w[1]).count();
    labels.len() + repeats
}

/// Сдвиг строк `(rows, states)` вправо на `k` с заполнением LOG_ZERO.
fn shift_right(x: &Tensor, k: usize) -> candle_core::Result<Tensor> {
    let (rows, len) = x.dims2()?;
    let fill = Tensor::full(LOG_ZERO, (rows, k.min(len)), x.device())?;
    if k >= len {
        return Ok(fill);
    }
    Tensor::cat(&[&fill, &x.narrow(1, 0, len - k)?], 1)
}

/// Численно устойчивый log Σ exp по измерению `dim`.
fn logsumexp(x: &Tensor, dim: usize) -> candle_core::Result<Tensor> {
    let max = x.max_keepdim(dim)?.detach();
    x.broadcast_sub(&max)?
        .exp()?
        .sum_keepdim(dim)?
        .log()?
        .add(&max)?
        .squeeze(dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    fn uniform(time: usize, batch: usize, classes: usize) -> Tensor {
        Tensor::zeros((time, batch, classes), DType::F32, &Device::Cpu).unwrap()
    }

    fn scalar(t: &Tensor) -> f32 {
        t.to_scalar::<f32>().unwrap()
    }

    #[test]
    fn test_single_frame_single_label() {
        let loss = ctc_loss(&uniform(1, 1, 2), &[1], &[1], &[1]).unwrap();
        assert!((scalar(&loss) - 2f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_two_frames_three_paths() {
        // Пути (1,1), (0,1), (1,0), у каждого вероятность 1/4.
        let loss = ctc_loss(&uniform(2, 1, 2), &[1], &[2], &[1]).unwrap();
        assert!((scalar(&loss) + 0.75f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_repeated_label_needs_blank() {
        // Единственный путь для [1, 1] за 3 фрейма: 1, 0, 1.
        let loss = ctc_loss(&uniform(3, 1, 2), &[1, 1], &[3], &[2]).unwrap();
        assert!((scalar(&loss) - 8f32.ln()).abs() < 1e-4);
    }

    #[test]
    fn test_infeasible_example_contributes_zero() {
        let loss = ctc_loss(&uniform(2, 1, 2), &[1, 1], &[2], &[2]).unwrap();
        assert_eq!(scalar(&loss), 0.0);

        let strict = CtcLoss {
            zero_infinity: false,
            ..CtcLoss::default()
        };
        assert!(strict.forward(&uniform(2, 1, 2), &[1, 1], &[2], &[2]).is_err());
    }

    #[test]
    fn test_batch_is_summed_and_respects_lengths() {
        // Пример 0 использует 1 фрейм из 2, пример 1: оба.
        let loss = ctc_loss(&uniform(2, 2, 2), &[1, 1], &[1, 2], &[1, 1]).unwrap();
        let expected = 2f32.ln() - 0.75f32.ln();
        assert!((scalar(&loss) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_batch_matches_per_example_losses() {
        // Несовпадающие длины выходов и меток, повтор метки во втором примере.
        let (time, batch, classes) = (6, 3, 4);
        let data: Vec<f32> = (0..time * batch * classes)
            .map(|i| ((i as f32) * 0.71).sin() * 2.0)
            .collect();
        let acts = Tensor::from_vec(data, (time, batch, classes), &Device::Cpu).unwrap();
        let targets = [1, 2, 3, 3, 2, 1, 3];
        let label_lengths = [2, 3, 2];
        let output_lengths = [4, 6, 5];

        let total = scalar(&ctc_loss(&acts, &targets, &output_lengths, &label_lengths).unwrap());

        let mut expected = 0.0;
        let mut offset = 0;
        for b in 0..batch {
            let single = acts.narrow(1, b, 1).unwrap().contiguous().unwrap();
            let labels = &targets[offset..offset + label_lengths[b]];
            offset += label_lengths[b];
            let loss = ctc_loss(&single, labels, &[output_lengths[b]], &[labels.len()]).unwrap();
            expected += scalar(&loss);
        }
        assert!((total - expected).abs() < 1e-4, "{} vs {}", total, expected);
    }

    #[test]
    fn test_infeasible_example_skipped_within_batch() {
        // Пример 1 требует 2 фрейма, а имеет 1.
        let loss = ctc_loss(&uniform(2, 2, 2), &[1, 1, 1], &[2, 1], &[1, 2]).unwrap();
        assert!((scalar(&loss) + 0.75f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_empty_label_is_all_blank_path() {
        let loss = ctc_loss(&uniform(3, 1, 2), &[], &[3], &[0]).unwrap();
        assert!((scalar(&loss) - 3.0 * 2f32.ln()).abs() < 1e-4);
    }

    #[test]
    fn test_gradient_is_softmax_minus_target() {
        let acts = candle_core::Var::zeros((1, 1, 2), DType::F32, &Device::Cpu).unwrap();
        let loss = ctc_loss(acts.as_tensor(), &[1], &[1], &[1]).unwrap();
        let grads = loss.backward().unwrap();
        let grad: Vec<f32> = grads
            .get(acts.as_tensor())
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert!((grad[0] - 0.5).abs() < 1e-5);
        assert!((grad[1] + 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_peaked_activations_give_small_loss() {
        // Активации, уверенно предсказывающие "0 1 0" (blank, 1, blank).
        let data: Vec<f32> = vec![10.0, -10.0, -10.0, 10.0, 10.0, -10.0];
        let acts = Tensor::from_vec(data, (3, 1, 2), &Device::Cpu).unwrap();
        let loss = ctc_loss(&acts, &[1], &[3], &[1]).unwrap();
        assert!(scalar(&loss) < 1e-3);
    }

    #[test]
    fn test_validation_errors() {
        let acts = uniform(2, 1, 3);
        assert!(ctc_loss(&acts, &[1, 2], &[2], &[1]).is_err());
        assert!(ctc_loss(&acts, &[0], &[2], &[1]).is_err());
        assert!(ctc_loss(&acts, &[3], &[2], &[1]).is_err());
        assert!(ctc_loss(&acts, &[1], &[3], &[1]).is_err());
        assert!(ctc_loss(&acts, &[1], &[2, 2], &[1, 0]).is_err());
    }

    #[test]
    fn test_min_frames() {
        assert_eq!(min_frames(&[1, 2, 3]), 3);
        assert_eq!(min_frames(&[1, 1, 2, 2]), 6);
        assert_eq!(min_frames(&[]), 0);
    }
}
