mod batch_norm;
mod layer;
mod pointwise;
mod relu;

pub use batch_norm::{BatchNorm, NormParams};
pub use layer::{Layer, backward_all, forward_all};
pub use pointwise::Pointwise;
pub use relu::Relu;
