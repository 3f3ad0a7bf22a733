pub mod layers;
pub mod loss;
mod model;
mod segnet;

pub use model::Model;
pub use segnet::{SegNet, SegNetConfig};
