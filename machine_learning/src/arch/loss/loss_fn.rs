use ndarray::{Array1, ArrayView1};

/// A per-element classification loss reduced by its mean.
pub trait LossFn {
    /// Computes the mean loss.
    ///
    /// # Arguments
    /// * `logits` - The raw scores, flattened.
    /// * `labels` - The targets, flattened, same length as `logits`.
    fn loss(&self, logits: ArrayView1<f32>, labels: ArrayView1<f32>) -> f32;

    /// Computes the derivative of the mean loss with respect to each logit.
    fn loss_prime(&self, logits: ArrayView1<f32>, labels: ArrayView1<f32>) -> Array1<f32>;
}
