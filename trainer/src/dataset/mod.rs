mod batch;
mod list;
mod memory;

pub use batch::Batch;
pub use list::ListDataset;
pub use memory::InMemoryDataset;

use crate::Result;

/// A source of training batches.
pub trait BatchProvider {
    /// The amount of examples in one pass over the data.
    fn total_examples(&self) -> usize;

    /// Fetches the next `size` examples, starting a new pass when the current one runs out.
    ///
    /// # Arguments
    /// * `size` - The amount of examples of the batch.
    ///
    /// # Returns
    /// The batch or an error if the examples couldn't be read.
    fn next_batch(&mut self, size: usize) -> Result<Batch>;
}
