//! Training harness for the interactive segmentation network: configuration, batch providers,
//! checkpoints and the training loop.

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod dataset;
pub mod driver;
pub mod error;

pub use error::{Result, TrainErr};
