mod composer;
mod label;

pub use composer::{GroupGradients, LOSS_SCALE, LossComposer, POS_WEIGHT, StepLoss};
pub use label::prepare_label;
