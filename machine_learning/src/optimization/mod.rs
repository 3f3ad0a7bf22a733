mod gradient_descent_with_momentum;
mod multi_group;
mod optimizer;
mod schedule;

pub use gradient_descent_with_momentum::GradientDescentWithMomentum;
pub use multi_group::{GroupRates, MomentumConfig, MultiGroupOptimizer};
pub use optimizer::Optimizer;
pub use schedule::PolyDecay;
