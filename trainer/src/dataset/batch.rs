use ndarray::{Array4, ArrayView4};

use crate::{Result, TrainErr};

/// A batch of images with their binary masks.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    images: Array4<f32>,
    labels: Array4<u8>,
}

impl Batch {
    /// Creates a new `Batch`.
    ///
    /// # Arguments
    /// * `images` - A `(batch, height, width, channels)` tensor.
    /// * `labels` - A `(batch, height, width, 1)` tensor.
    ///
    /// # Returns
    /// A new `Batch` or an error if both tensors don't describe the same pixels.
    pub fn new(images: Array4<f32>, labels: Array4<u8>) -> Result<Self> {
        let (n, h, w, _) = images.dim();
        if labels.dim() != (n, h, w, 1) {
            return Err(TrainErr::BatchShape {
                images: images.shape().to_vec(),
                labels: labels.shape().to_vec(),
            });
        }

        Ok(Self { images, labels })
    }

    pub fn images(&self) -> ArrayView4<'_, f32> {
        self.images.view()
    }

    pub fn labels(&self) -> ArrayView4<'_, u8> {
        self.labels.view()
    }

    pub fn len(&self) -> usize {
        self.images.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
