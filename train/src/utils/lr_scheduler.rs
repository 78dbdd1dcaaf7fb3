use crate::common::*;

/// Polynomial learning-rate schedule over three optimizer groups (backbone,
/// ASPP weights, ASPP biases).
///
/// On iterations divisible by the decay interval, and only while the
/// iteration has not passed `max_iter`, the base rate is recomputed as
/// `base_lr * (1 - iter / max_iter) ^ power` and the group multipliers are
/// reapplied. Other iterations keep the previous rates.
#[derive(Debug, Clone)]
pub struct PolyLrScheduler {
    base_lr: f64,
    power: f64,
    decay_interval: usize,
    max_iter: usize,
    weight_mult: f64,
    bias_mult: f64,
    lrs: [f64; 3],
}

impl PolyLrScheduler {
    pub fn new(
        base_lr: f64,
        power: f64,
        decay_interval: usize,
        max_iter: usize,
        weight_mult: f64,
        bias_mult: f64,
    ) -> Result<Self> {
        ensure!(base_lr > 0.0, "base_lr must be positive");
        ensure!(decay_interval >= 1, "the decay interval must be at least 1");
        ensure!(max_iter >= 1, "max_iter must be at least 1");
        ensure!(
            weight_mult > 0.0 && bias_mult > 0.0,
            "group multipliers must be positive"
        );

        Ok(Self {
            base_lr,
            power,
            decay_interval,
            max_iter,
            weight_mult,
            bias_mult,
            lrs: [
                base_lr,
                base_lr * weight_mult,
                base_lr * bias_mult,
            ],
        })
    }

    /// Advances the schedule to `iteration`. Returns the new per-group rates
    /// when the iteration is a decay boundary, `None` otherwise.
    pub fn step(&mut self, iteration: usize) -> Option<[f64; 3]> {
        if iteration % self.decay_interval != 0 || iteration > self.max_iter {
            return None;
        }
        let decayed =
            self.base_lr * (1.0 - iteration as f64 / self.max_iter as f64).powf(self.power);
        self.lrs = [
            decayed,
            decayed * self.weight_mult,
            decayed * self.bias_mult,
        ];
        Some(self.lrs)
    }

    /// The current [backbone, ASPP weight, ASPP bias] rates.
    pub fn lrs(&self) -> [f64; 3] {
        self.lrs
    }
}
