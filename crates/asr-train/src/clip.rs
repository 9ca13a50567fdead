//! Клиппинг градиентов по глобальной L2-норме.
//!
//! Норма считается сразу по всем параметрам; при превышении порога все
//! градиенты умножаются на один и тот же коэффициент `max_norm / norm`.

use candle_core::backprop::GradStore;
use candle_core::{DType, Result, Var};

/// Коэффициент масштабирования, если норма превышает порог.
pub fn clip_scale(norm: f64, max_norm: f64) -> Option<f64> {
    if norm > max_norm {
        Some(max_norm / norm)
    } else {
        None
    }
}

/// L2-норма всех градиентов `vars`, присутствующих в `grads`.
pub fn global_grad_norm(vars: &[Var], grads: &GradStore) -> Result<f64> {
    let mut total = 0f64;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            total += grad
                .sqr()?
                .sum_all()?
                .to_dtype(DType::F64)?
                .to_scalar::<f64>()?;
        }
    }
    Ok(total.sqrt())
}

/// Clip gradients in place and return the norm measured before clipping.
pub fn clip_grad_norm(vars: &[Var], grads: &mut GradStore, max_norm: f64) -> Result<f64> {
    let norm = global_grad_norm(vars, grads)?;
    if let Some(scale) = clip_scale(norm, max_norm) {
        for var in vars {
            if let Some(grad) = grads.get(var.as_tensor()) {
                let scaled = grad.affine(scale, 0.0)?;
                grads.insert(var.as_tensor(), scaled);
            }
        }
    }
    Ok(norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Tensor};

    /// Градиенты `grad_values` для каждого параметра через loss = Σ w·c.
    fn setup(grad_values: &[&[f32]]) -> (Vec<Var>, GradStore) {
        let device = Device::Cpu;
        let mut vars = Vec::new();
        let mut loss: Option<Tensor> = None;
        for values in grad_values {
            let var = Var::zeros(values.len(), DType::F32, &device).unwrap();
            let coeff = Tensor::new(*values, &device).unwrap();
            let term = var.as_tensor().mul(&coeff).unwrap().sum_all().unwrap();
            loss = Some(match loss {
                Some(acc) => acc.add(&term).unwrap(),
                None => term,
            });
            vars.push(var);
        }
        let grads = loss.unwrap().backward().unwrap();
        (vars, grads)
    }

    fn grad_of(vars: &[Var], grads: &GradStore, i: usize) -> Vec<f32> {
        grads.get(vars[i].as_tensor()).unwrap().to_vec1().unwrap()
    }

    #[test]
    fn test_clip_scale() {
        assert_eq!(clip_scale(10.0, 5.0), Some(0.5));
        assert_eq!(clip_scale(5.0, 5.0), None);
        assert_eq!(clip_scale(1.0, 400.0), None);
    }

    #[test]
    fn test_norm_is_global_across_parameters() {
        let (vars, grads) = setup(&[&[3.0], &[4.0]]);
        let norm = global_grad_norm(&vars, &grads).unwrap();
        assert!((norm - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_scales_every_gradient_uniformly() {
        let (vars, mut grads) = setup(&[&[3.0], &[4.0]]);
        let norm = clip_grad_norm(&vars, &mut grads, 1.0).unwrap();
        assert!((norm - 5.0).abs() < 1e-9);

        let a = grad_of(&vars, &grads, 0);
        let b = grad_of(&vars, &grads, 1);
        assert!((a[0] - 0.6).abs() < 1e-6);
        assert!((b[0] - 0.8).abs() < 1e-6);
        assert!((global_grad_norm(&vars, &grads).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_below_threshold_unchanged() {
        let (vars, mut grads) = setup(&[&[3.0, 4.0]]);
        let norm = clip_grad_norm(&vars, &mut grads, 400.0).unwrap();
        assert!((norm - 5.0).abs() < 1e-9);
        assert_eq!(grad_of(&vars, &grads, 0), vec![3.0, 4.0]);
    }
}
