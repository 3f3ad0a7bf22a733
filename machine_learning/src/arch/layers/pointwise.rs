use ndarray::{Array2, Axis, linalg};

use crate::{
    MlErr, Result,
    params::{Gradients, ParamId, ParamStore},
};

/// A 1x1 convolution over a batch of pixels laid out as `(pixels, channels)`.
///
/// Optimizations:
///   1. Find a way to not copy `x` in each `Pointwise::forward` call.
#[derive(Debug, Clone)]
pub struct Pointwise {
    weights: ParamId,
    biases: Option<ParamId>,

    // Forward metadata
    x: Option<Array2<f32>>,
}

impl Pointwise {
    /// Creates a new `Pointwise`.
    ///
    /// # Arguments
    /// * `weights` - The `(in_channels, out_channels)` kernel.
    /// * `biases` - An optional `out_channels` bias vector.
    ///
    /// # Returns
    /// A new `Pointwise` instance.
    pub fn new(weights: ParamId, biases: Option<ParamId>) -> Self {
        Self {
            weights,
            biases,
            x: None,
        }
    }

    pub fn forward(&mut self, params: &ParamStore, x: Array2<f32>) -> Result<Array2<f32>> {
        let w = params.view2(self.weights)?;

        if x.ncols() != w.nrows() {
            return Err(MlErr::SizeMismatch {
                what: "pointwise input channels",
                got: x.ncols(),
                expected: w.nrows(),
            });
        }

        let mut z = Array2::zeros((x.nrows(), w.ncols()));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);

        if let Some(biases) = self.biases {
            z += &params.view1(biases)?;
        }

        self.x = Some(x);
        Ok(z)
    }

    pub fn backward(
        &mut self,
        params: &ParamStore,
        d: Array2<f32>,
        grads: &mut Gradients,
    ) -> Result<Array2<f32>> {
        let x = self
            .x
            .take()
            .ok_or(MlErr::MissingForwardPass { layer: "pointwise" })?;
        let w = params.view2(self.weights)?;

        grads.accumulate(self.weights, x.t().dot(&d).into_dyn());
        if let Some(biases) = self.biases {
            grads.accumulate(biases, d.sum_axis(Axis(0)).into_dyn());
        }

        Ok(d.dot(&w.t()))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn, array};

    use super::*;
    use crate::params::{Param, ParamKind};

    fn store() -> (ParamStore, ParamId, ParamId) {
        let mut store = ParamStore::new();
        let w = ArrayD::from_shape_vec(IxDyn(&[2, 1]), vec![2., -1.]).unwrap();
        let w = store
            .push(Param::new("fc1/weights", ParamKind::Weights, w).unwrap())
            .unwrap();
        let b = store
            .push(Param::filled("fc1/biases", ParamKind::Biases, &[1], 0.5).unwrap())
            .unwrap();
        (store, w, b)
    }

    #[test]
    fn forward_backward() {
        let (store, w, b) = store();
        let mut layer = Pointwise::new(w, Some(b));
        let mut grads = Gradients::new(store.len());

        let z = layer.forward(&store, array![[1., 1.], [3., 2.]]).unwrap();
        assert_eq!(z, array![[1.5f32], [4.5]]);

        let dx = layer
            .backward(&store, array![[1.], [-1.]], &mut grads)
            .unwrap();

        assert_eq!(dx, array![[2f32, -1.], [-2., 1.]]);
        assert_eq!(grads.get(w).unwrap().as_slice().unwrap(), &[-2f32, -1.]);
        assert_eq!(grads.get(b).unwrap().as_slice().unwrap(), &[0f32]);
    }

    #[test]
    fn backward_needs_forward() {
        let (store, w, b) = store();
        let mut layer = Pointwise::new(w, Some(b));
        let mut grads = Gradients::new(store.len());

        assert!(layer.backward(&store, array![[1.]], &mut grads).is_err());
    }
}
