use crate::params::{Gradients, ParamStore};

/// L2 regularization over every `Weights` parameter: `weight_decay * sum(||w||^2 / 2)`.
#[derive(Debug, Clone, Copy)]
pub struct L2 {
    weight_decay: f32,
}

impl L2 {
    pub fn new(weight_decay: f32) -> Self {
        Self { weight_decay }
    }

    /// Computes the regularization term of the current parameters.
    pub fn penalty(&self, params: &ParamStore) -> f32 {
        let sum: f32 = params
            .iter()
            .filter(|(_, p)| p.kind().is_regularized())
            .map(|(_, p)| p.value().iter().map(|w| w * w).sum::<f32>() / 2.)
            .sum();

        self.weight_decay * sum
    }

    /// Adds `weight_decay * w` to the gradient of every regularized parameter.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grads` - The gradients of the data term.
    pub fn add_gradients(&self, params: &ParamStore, grads: &mut Gradients) {
        if self.weight_decay == 0. {
            return;
        }

        for (id, param) in params.iter().filter(|(_, p)| p.kind().is_regularized()) {
            grads.accumulate(id, param.value() * self.weight_decay);
        }
    }
}
