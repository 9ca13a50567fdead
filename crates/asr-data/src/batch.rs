//! Батч обучающих данных и trait источника батчей.

use asr_core::AsrResult;

/// Один минибатч в формате, который ожидает цикл обучения.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Спектрограммы, `batch × freq × time` подряд.
    pub features: Vec<f32>,

    /// Метки всех примеров подряд, без паддинга.
    pub targets: Vec<u32>,

    /// Длина метки каждого примера.
    pub label_lengths: Vec<usize>,

    /// Доля валидных фреймов каждого примера в `[0, 1]`.
    pub valid_fractions: Vec<f32>,
}

impl Batch {
    /// Количество примеров.
    pub fn size(&self) -> usize {
        self.label_lengths.len()
    }
}

/// Источник батчей для цикла обучения.
pub trait BatchSource {
    /// Количество батчей за одну эпоху.
    fn num_batches(&self) -> usize;

    /// Подготовиться к новой эпохе (перемешивание, сброс курсора).
    fn start_epoch(&mut self, epoch: usize);

    /// Следующий батч эпохи или `None`, если эпоха закончилась.
    fn next_batch(&mut self) -> AsrResult<Option<Batch>>;
}

/// Replays a fixed list of batches every epoch.
#[derive(Debug, Clone)]
pub struct VecBatchSource {
    batches: Vec<Batch>,
    cursor: usize,
}

impl VecBatchSource {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches, cursor: 0 }
    }
}

impl BatchSource for VecBatchSource {
    fn num_batches(&self) -> usize {
        self.batches.len()
    }

    fn start_epoch(&mut self, _epoch: usize) {
        self.cursor = 0;
    }

    fn next_batch(&mut self) -> AsrResult<Option<Batch>> {
        let batch = self.batches.get(self.cursor).cloned();
        if batch.is_some() {
            self.cursor += 1;
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: usize) -> Batch {
        Batch {
            features: vec![0.0; n * 4],
            targets: vec![1; n],
            label_lengths: vec![1; n],
            valid_fractions: vec![1.0; n],
        }
    }

    #[test]
    fn test_vec_source_replays_each_epoch() {
        let mut source = VecBatchSource::new(vec![batch(2), batch(3)]);
        assert_eq!(source.num_batches(), 2);

        for epoch in 1..=2 {
            source.start_epoch(epoch);
            assert_eq!(source.next_batch().unwrap().unwrap().size(), 2);
            assert_eq!(source.next_batch().unwrap().unwrap().size(), 3);
            assert!(source.next_batch().unwrap().is_none());
        }
    }
}
