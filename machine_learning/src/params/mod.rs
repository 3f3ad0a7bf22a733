mod gradients;
mod param;
mod partition;
mod store;

pub use gradients::Gradients;
pub use param::{FIRST_LAYER_MARKER, HEAD_MARKER, Param, ParamGroup, ParamKind};
pub use partition::Partition;
pub use store::{ParamId, ParamStore};
