use super::Optimizer;
use crate::{MlErr, Result};

#[derive(Debug)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    velocity: Box<[f32]>,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - The decay of the accumulated velocity.
    ///
    /// # Returns
    /// A new `GradientDescentWithMomentum` instance.
    pub fn new(len: usize, learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: vec![0.; len].into_boxed_slice(),
        }
    }

    pub fn velocity(&self) -> &[f32] {
        &self.velocity
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        for (what, got) in [("gradient", grad.len()), ("parameters", params.len())] {
            if got != self.velocity.len() {
                return Err(MlErr::SizeMismatch {
                    what,
                    got,
                    expected: self.velocity.len(),
                });
            }
        }

        let lr = self.learning_rate;
        let mu = self.momentum;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.velocity.iter_mut())
            .for_each(|((p, g), v)| {
                *v = (mu * *v) + g;
                *p -= lr * *v;
            });

        Ok(())
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_accumulates() {
        let mut optimizer = GradientDescentWithMomentum::new(2, 0.1, 0.5);
        let mut params = [1., 2.];

        optimizer.update_params(&[1., -1.], &mut params).unwrap();
        assert_eq!(optimizer.velocity(), &[1f32, -1.]);

        optimizer.update_params(&[1., -1.], &mut params).unwrap();
        assert_eq!(optimizer.velocity(), &[1.5f32, -1.5]);

        // 1 - 0.1 * (1 + 1.5), 2 + 0.1 * (1 + 1.5)
        assert!((params[0] - 0.75f32).abs() < 1e-6);
        assert!((params[1] - 2.25f32).abs() < 1e-6);
    }

    #[test]
    fn size_mismatch() {
        let mut optimizer = GradientDescentWithMomentum::new(2, 0.1, 0.9);
        assert!(optimizer.update_params(&[1.], &mut [1., 2.]).is_err());
        assert!(optimizer.update_params(&[1., 1.], &mut [1.]).is_err());
    }
}
