//! Running averages for progress reporting.

/// Текущее значение и накопленное среднее взвешенного потока наблюдений.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AverageMeter {
    pub val: f64,
    pub avg: f64,
    pub sum: f64,
    pub count: f64,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record `val` with weight `n`. The weight is not checked.
    pub fn update(&mut self, val: f64, n: f64) {
        self.val = val;
        self.sum += val * n;
        self.count += n;
        if self.count != 0.0 {
            self.avg = self.sum / self.count;
        }
    }
}
