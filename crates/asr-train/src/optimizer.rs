//! SGD с моментумом (семантика `torch.optim.SGD`).
//!
//! `candle_nn::SGD` не поддерживает моментум, поэтому здесь своя реализация
//! того же trait [`candle_nn::Optimizer`]:
//!
//! ```text
//! buf = grad                      (первый шаг)
//! buf = momentum * buf + grad     (далее)
//! p   = p - lr * buf
//! ```

use candle_core::backprop::GradStore;
use candle_core::{Result, Tensor, Var};
use candle_nn::Optimizer;
use serde::{Deserialize, Serialize};

/// Гиперпараметры SGD.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SgdMomentumConfig {
    pub lr: f64,
    pub momentum: f64,
}

impl Default for SgdMomentumConfig {
    fn default() -> Self {
        Self {
            lr: 3e-4,
            momentum: 0.9,
        }
    }
}

#[derive(Debug)]
struct VarState {
    var: Var,
    buffer: Option<Tensor>,
}

/// SGD optimizer with a per-parameter momentum buffer.
#[derive(Debug)]
pub struct SgdMomentum {
    vars: Vec<VarState>,
    config: SgdMomentumConfig,
}

impl SgdMomentum {
    pub fn config(&self) -> &SgdMomentumConfig {
        &self.config
    }

    /// Параметры, которыми управляет оптимизатор.
    pub fn vars(&self) -> Vec<Var> {
        self.vars.iter().map(|s| s.var.clone()).collect()
    }
}

impl Optimizer for SgdMomentum {
    type Config = SgdMomentumConfig;

    fn new(vars: Vec<Var>, config: SgdMomentumConfig) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|v| v.dtype().is_float())
            .map(|var| VarState { var, buffer: None })
            .collect();
        Ok(Self { vars, config })
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        let SgdMomentumConfig { lr, momentum } = self.config;
        for state in self.vars.iter_mut() {
            let Some(grad) = grads.get(state.var.as_tensor()) else {
                continue;
            };
            let buffer = match (&state.buffer, momentum != 0.0) {
                (Some(prev), true) => prev.affine(momentum, 0.0)?.add(grad)?,
                _ => grad.clone(),
            };
            let buffer = buffer.detach();
            state
                .var
                .set(&state.var.as_tensor().sub(&buffer.affine(lr, 0.0)?)?)?;
            state.buffer = Some(buffer);
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.config.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.config.lr = lr;
    }
}
