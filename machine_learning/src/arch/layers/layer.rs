use ndarray::Array2;

use super::{BatchNorm, Pointwise, Relu};
use crate::{
    Result,
    params::{Gradients, ParamStore},
};

#[derive(Debug, Clone)]
pub enum Layer {
    Pointwise(Pointwise),
    BatchNorm(BatchNorm),
    Relu(Relu),
}

impl Layer {
    pub fn forward(&mut self, params: &mut ParamStore, x: Array2<f32>) -> Result<Array2<f32>> {
        match self {
            Layer::Pointwise(l) => l.forward(params, x),
            Layer::BatchNorm(l) => l.forward(params, x),
            Layer::Relu(l) => Ok(l.forward(x)),
        }
    }

    pub fn backward(
        &mut self,
        params: &ParamStore,
        d: Array2<f32>,
        grads: &mut Gradients,
    ) -> Result<Array2<f32>> {
        match self {
            Layer::Pointwise(l) => l.backward(params, d, grads),
            Layer::BatchNorm(l) => l.backward(params, d, grads),
            Layer::Relu(l) => l.backward(d),
        }
    }
}

/// Runs `x` through `layers` front to back.
pub fn forward_all(
    layers: &mut [Layer],
    params: &mut ParamStore,
    mut x: Array2<f32>,
) -> Result<Array2<f32>> {
    for layer in layers {
        x = layer.forward(params, x)?;
    }

    Ok(x)
}

/// Runs `d` through `layers` back to front, accumulating their gradients.
pub fn backward_all(
    layers: &mut [Layer],
    params: &ParamStore,
    mut d: Array2<f32>,
    grads: &mut Gradients,
) -> Result<Array2<f32>> {
    for layer in layers.iter_mut().rev() {
        d = layer.backward(params, d, grads)?;
    }

    Ok(d)
}
