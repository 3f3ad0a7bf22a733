use ndarray::{Array3, ArrayView3, ArrayView4};

use crate::{
    Result,
    params::{Gradients, ParamStore},
};

/// A segmentation network: maps a batch of images to one raw score per output pixel.
///
/// The model only holds its structure, every tensor it reads lives in the `ParamStore` it is
/// handed, which is also what the optimizer updates and the checkpoints persist.
pub trait Model {
    /// Computes the raw scores of a batch.
    ///
    /// # Arguments
    /// * `params` - The model's parameters. Layers that track running statistics may update them.
    /// * `images` - A `(batch, height, width, channels)` tensor.
    ///
    /// # Returns
    /// A `(batch, out_height, out_width)` tensor of logits.
    fn forward(&mut self, params: &mut ParamStore, images: ArrayView4<'_, f32>) -> Result<Array3<f32>>;

    /// Back-propagates the derivative of the loss with respect to the scores of the last
    /// `forward` call.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `d_scores` - The derivative of the loss with respect to each score.
    ///
    /// # Returns
    /// The gradient of every trainable parameter.
    fn backward(&mut self, params: &ParamStore, d_scores: ArrayView3<'_, f32>) -> Result<Gradients>;
}
