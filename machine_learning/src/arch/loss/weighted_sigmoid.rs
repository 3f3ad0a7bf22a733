use ndarray::{Array1, ArrayView1, Zip};

use super::LossFn;

/// Sigmoid cross-entropy with logits where positive targets weigh `pos_weight` times more.
///
/// Computed in the numerically stable form
/// `(1 - z) * x + (1 + (q - 1) * z) * (ln(1 + e^-|x|) + max(-x, 0))`.
#[derive(Debug, Clone, Copy)]
pub struct WeightedSigmoidCrossEntropy {
    pos_weight: f32,
}

impl WeightedSigmoidCrossEntropy {
    /// Returns a new `WeightedSigmoidCrossEntropy`.
    ///
    /// # Arguments
    /// * `pos_weight` - The weight of the positive targets relative to the negative ones.
    pub fn new(pos_weight: f32) -> Self {
        Self { pos_weight }
    }

    fn element(&self, x: f32, z: f32) -> f32 {
        let l = 1. + (self.pos_weight - 1.) * z;
        (1. - z) * x + l * ((-x.abs()).exp().ln_1p() + (-x).max(0.))
    }

    fn element_prime(&self, x: f32, z: f32) -> f32 {
        let l = 1. + (self.pos_weight - 1.) * z;
        (1. - z) - l * sigmoid(-x)
    }
}

impl LossFn for WeightedSigmoidCrossEntropy {
    fn loss(&self, logits: ArrayView1<f32>, labels: ArrayView1<f32>) -> f32 {
        if logits.is_empty() {
            return 0.;
        }

        let sum = Zip::from(&logits)
            .and(&labels)
            .fold(0., |acc, &x, &z| acc + self.element(x, z));

        sum / logits.len() as f32
    }

    fn loss_prime(&self, logits: ArrayView1<f32>, labels: ArrayView1<f32>) -> Array1<f32> {
        let n = logits.len().max(1) as f32;
        Zip::from(&logits)
            .and(&labels)
            .map_collect(|&x, &z| self.element_prime(x, z) / n)
    }
}

fn sigmoid(x: f32) -> f32 {
    if x >= 0. {
        1. / (1. + (-x).exp())
    } else {
        let e = x.exp();
        e / (1. + e)
    }
}
