mod l2;
mod loss_fn;
mod weighted_sigmoid;

pub use l2::L2;
pub use loss_fn::LossFn;
pub use weighted_sigmoid::WeightedSigmoidCrossEntropy;
