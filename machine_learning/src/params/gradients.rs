use ndarray::ArrayD;

use super::ParamId;

/// The gradients produced by a backward pass, one optional tensor per parameter of the store.
#[derive(Debug, Clone, Default)]
pub struct Gradients {
    grads: Vec<Option<ArrayD<f32>>>,
}

impl Gradients {
    /// Creates a new `Gradients` able to hold `len` parameters' gradients.
    pub fn new(len: usize) -> Self {
        Self {
            grads: vec![None; len],
        }
    }

    /// Adds `grad` to the gradient of `id`, storing it if it's the first one.
    ///
    /// # Panics
    /// If `id` is out of range or the shapes of both gradients differ.
    pub fn accumulate(&mut self, id: ParamId, grad: ArrayD<f32>) {
        match &mut self.grads[id.index()] {
            Some(acc) => *acc += &grad,
            slot => *slot = Some(grad),
        }
    }

    pub fn get(&self, id: ParamId) -> Option<&ArrayD<f32>> {
        self.grads.get(id.index()).and_then(Option::as_ref)
    }

    pub fn take(&mut self, id: ParamId) -> Option<ArrayD<f32>> {
        self.grads.get_mut(id.index()).and_then(Option::take)
    }

    /// Amount of parameters that received a gradient.
    pub fn count(&self) -> usize {
        self.grads.iter().filter(|g| g.is_some()).count()
    }
}
