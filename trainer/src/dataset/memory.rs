use ndarray::{Array4, Axis};

use super::{Batch, BatchProvider};
use crate::{Result, TrainErr};

/// A dataset fully loaded in memory, served in order and wrapping around at the end.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    examples: Batch,
    cursor: usize,
}

impl InMemoryDataset {
    /// Creates a new `InMemoryDataset`.
    ///
    /// # Arguments
    /// * `images` - A `(examples, height, width, channels)` tensor.
    /// * `labels` - A `(examples, height, width, 1)` tensor.
    ///
    /// # Returns
    /// A new `InMemoryDataset` or an error if the tensors don't match or hold no examples.
    pub fn new(images: Array4<f32>, labels: Array4<u8>) -> Result<Self> {
        let examples = Batch::new(images, labels)?;
        if examples.is_empty() {
            return Err(TrainErr::EmptyDataset);
        }

        Ok(Self {
            examples,
            cursor: 0,
        })
    }
}

impl BatchProvider for InMemoryDataset {
    fn total_examples(&self) -> usize {
        self.examples.len()
    }

    fn next_batch(&mut self, size: usize) -> Result<Batch> {
        let n = self.examples.len();
        let indices: Vec<_> = (0..size).map(|i| (self.cursor + i) % n).collect();
        self.cursor = (self.cursor + size) % n;

        Batch::new(
            self.examples.images().select(Axis(0), &indices),
            self.examples.labels().select(Axis(0), &indices),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_around() {
        let images = Array4::from_shape_fn((3, 1, 1, 1), |(i, ..)| i as f32);
        let labels = Array4::from_shape_fn((3, 1, 1, 1), |(i, ..)| i as u8);
        let mut dataset = InMemoryDataset::new(images, labels).unwrap();
        assert_eq!(dataset.total_examples(), 3);

        let first = dataset.next_batch(2).unwrap();
        assert_eq!(first.images().iter().copied().collect::<Vec<_>>(), [0., 1.]);

        let second = dataset.next_batch(2).unwrap();
        assert_eq!(second.images().iter().copied().collect::<Vec<_>>(), [2., 0.]);
        assert_eq!(second.labels().iter().copied().collect::<Vec<_>>(), [2, 0]);
    }

    #[test]
    fn empty() {
        let images = Array4::zeros((0, 2, 2, 5));
        let labels = Array4::zeros((0, 2, 2, 1));
        assert!(matches!(
            InMemoryDataset::new(images, labels),
            Err(TrainErr::EmptyDataset)
        ));
    }

    #[test]
    fn mismatched_labels() {
        let images = Array4::zeros((2, 2, 2, 5));
        let labels = Array4::zeros((2, 3, 2, 1));
        assert!(InMemoryDataset::new(images, labels).is_err());
    }
}
