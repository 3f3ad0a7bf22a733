use crate::{MlErr, Result};

/// Decays a base learning rate with the fraction of training completed:
/// `base_lr * power^(step / total_steps)`.
#[derive(Debug, Clone, Copy)]
pub struct PolyDecay {
    base_lr: f32,
    power: f32,
    total_steps: usize,
}

impl PolyDecay {
    /// Creates a new `PolyDecay` schedule.
    ///
    /// # Arguments
    /// * `base_lr` - The learning rate at step 0.
    /// * `power` - The base of the decay, the rate at the end of training is `base_lr * power`.
    /// * `total_steps` - The amount of steps of the whole run.
    ///
    /// # Returns
    /// A new `PolyDecay` or an error if `total_steps` is zero.
    pub fn new(base_lr: f32, power: f32, total_steps: usize) -> Result<Self> {
        if total_steps == 0 {
            return Err(MlErr::EmptySchedule);
        }

        Ok(Self {
            base_lr,
            power,
            total_steps,
        })
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// The learning rate of `step`.
    pub fn learning_rate(&self, step: usize) -> f32 {
        let progress = step as f64 / self.total_steps as f64;
        (self.base_lr as f64 * (self.power as f64).powf(progress)) as f32
    }
}
