//! Parameters, variable groups, the segmentation network and the pieces of a training step:
//! loss, gradients and the per-group optimizers.

pub mod arch;
pub mod error;
pub mod initialization;
pub mod optimization;
pub mod params;
pub mod training;

pub use error::{MlErr, Result};
