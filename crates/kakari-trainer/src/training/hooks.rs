//! # Optimizer Hooks
//!
//! Adjustments applied on every parameter update, after the backward pass
//! and before the optimizer step. They may rewrite gradients or change
//! the learning rate.

use candle_core::backprop::GradStore;
use candle_core::{DType, Var};
use tracing::debug;

use crate::error::Result;

/// What a hook can see and change during one update.
pub struct UpdateContext<'a> {
    pub vars: &'a [Var],
    pub grads: &'a mut GradStore,
    /// Learning rate the step will use.
    pub learning_rate: f64,
    /// Number of updates already applied.
    pub step: u64,
}

pub trait OptimizerHook {
    fn name(&self) -> &str;

    fn on_update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<()>;
}

/// Rescales all gradients when their global L2 norm exceeds `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientClipping {
    threshold: f64,
}

impl GradientClipping {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Global L2 norm over the gradients of `vars`.
pub fn global_norm(vars: &[Var], grads: &GradStore) -> Result<f64> {
    let mut sum = 0.0;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            sum += grad
                .sqr()?
                .sum_all()?
                .to_dtype(DType::F64)?
                .to_scalar::<f64>()?;
        }
    }
    Ok(sum.sqrt())
}

impl OptimizerHook for GradientClipping {
    fn name(&self) -> &str {
        "gradient_clipping"
    }

    fn on_update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<()> {
        let norm = global_norm(ctx.vars, ctx.grads)?;
        if norm <= self.threshold {
            return Ok(());
        }
        let rate = self.threshold / norm;
        for var in ctx.vars {
            let scaled = match ctx.grads.get(var.as_tensor()) {
                Some(grad) => grad.affine(rate, 0.0)?,
                None => continue,
            };
            ctx.grads.insert(var.as_tensor(), scaled);
        }
        debug!(norm, rate, "clipped gradients");
        Ok(())
    }
}

/// `lr = initial_lr * decay_rate ^ (t / decay_step)`, where `t` is the
/// number of updates already applied. With `staircase` the exponent is
/// floored, so the rate drops every `decay_step` updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialDecayAnnealing {
    initial_lr: f64,
    decay_rate: f64,
    decay_step: u64,
    staircase: bool,
}

impl ExponentialDecayAnnealing {
    pub fn new(initial_lr: f64, decay_rate: f64, decay_step: u64) -> Self {
        Self {
            initial_lr,
            decay_rate,
            decay_step: decay_step.max(1),
            staircase: true,
        }
    }

    pub fn with_staircase(mut self, staircase: bool) -> Self {
        self.staircase = staircase;
        self
    }

    /// Learning rate after `t` updates.
    pub fn rate_at(&self, t: u64) -> f64 {
        let exponent = if self.staircase {
            (t / self.decay_step) as f64
        } else {
            t as f64 / self.decay_step as f64
        };
        self.initial_lr * self.decay_rate.powf(exponent)
    }
}

impl OptimizerHook for ExponentialDecayAnnealing {
    fn name(&self) -> &str {
        "exponential_decay_annealing"
    }

    fn on_update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<()> {
        ctx.learning_rate = self.rate_at(ctx.step);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Tensor};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn staircase_schedule() {
        let anneal = ExponentialDecayAnnealing::new(2e-3, 0.75, 5000);
        assert!(approx(anneal.rate_at(0), 2e-3));
        assert!(approx(anneal.rate_at(4999), 2e-3));
        assert!(approx(anneal.rate_at(5000), 1.5e-3));
        assert!(approx(anneal.rate_at(10_000), 1.125e-3));
    }

    #[test]
    fn continuous_schedule() {
        let anneal = ExponentialDecayAnnealing::new(1.0, 0.5, 10).with_staircase(false);
        assert!(approx(anneal.rate_at(5), 0.5f64.sqrt()));
        assert!(approx(anneal.rate_at(10), 0.5));
    }

    fn grads_for(vars: &[Var], loss: &Tensor) -> GradStore {
        let grads = loss.backward().unwrap();
        assert!(vars.iter().all(|v| grads.get(v.as_tensor()).is_some()));
        grads
    }

    #[test]
    fn clipping_rescales_to_threshold() {
        let x = Var::new(&[3.0f32, 4.0], &Device::Cpu).unwrap();
        let vars = vec![x.clone()];
        // d/dx of sum(x^2 / 2) is x, so the gradient norm is 5.
        let loss = x.as_tensor().sqr().unwrap().sum_all().unwrap().affine(0.5, 0.0).unwrap();
        let mut grads = grads_for(&vars, &loss);

        let mut ctx = UpdateContext {
            vars: &vars,
            grads: &mut grads,
            learning_rate: 0.1,
            step: 0,
        };
        GradientClipping::new(1.0).on_update(&mut ctx).unwrap();

        assert!(approx(global_norm(&vars, &grads).unwrap(), 1.0));
        let clipped = grads.get(x.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        assert!(approx(clipped[0] as f64, 0.6));
        assert!(approx(clipped[1] as f64, 0.8));
    }

    #[test]
    fn small_gradients_are_untouched() {
        let x = Var::new(&[0.3f32, 0.4], &Device::Cpu).unwrap();
        let vars = vec![x.clone()];
        let loss = x.as_tensor().sqr().unwrap().sum_all().unwrap().affine(0.5, 0.0).unwrap();
        let mut grads = grads_for(&vars, &loss);

        let mut ctx = UpdateContext {
            vars: &vars,
            grads: &mut grads,
            learning_rate: 0.1,
            step: 0,
        };
        GradientClipping::new(5.0).on_update(&mut ctx).unwrap();
        assert!(approx(global_norm(&vars, &grads).unwrap(), 0.5));
    }

    #[test]
    fn annealing_sets_learning_rate() {
        let x = Var::new(&[1.0f32], &Device::Cpu).unwrap();
        let vars = vec![x.clone()];
        let loss = x.as_tensor().sum_all().unwrap();
        let mut grads = grads_for(&vars, &loss);

        let mut ctx = UpdateContext {
            vars: &vars,
            grads: &mut grads,
            learning_rate: 2e-3,
            step: 5000,
        };
        ExponentialDecayAnnealing::new(2e-3, 0.75, 5000)
            .on_update(&mut ctx)
            .unwrap();
        assert!(approx(ctx.learning_rate, 1.5e-3));
    }
}
