use ndarray::{Array1, Array2, Axis, Ix1};

use crate::{
    MlErr, Result,
    params::{Gradients, ParamId, ParamStore},
};

/// The handles of the four tensors a batch normalization layer owns.
#[derive(Debug, Clone, Copy)]
pub struct NormParams {
    pub gamma: ParamId,
    pub beta: ParamId,
    pub moving_mean: ParamId,
    pub moving_variance: ParamId,
}

#[derive(Debug, Clone)]
struct NormCache {
    x_hat: Array2<f32>,
    inv_std: Array1<f32>,
}

/// Per-channel batch normalization over `(pixels, channels)` inputs.
///
/// When `training` is off the moving statistics are used as they are (frozen), otherwise the
/// layer normalizes with the statistics of the current batch and folds them into the moving ones.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    params: NormParams,
    eps: f32,
    decay: f32,
    training: bool,

    // Forward metadata
    cache: Option<NormCache>,
}

impl BatchNorm {
    /// Creates a new `BatchNorm`.
    ///
    /// # Arguments
    /// * `params` - The handles of the layer's tensors.
    /// * `eps` - Added to the variance to avoid dividing by zero.
    /// * `decay` - The weight of the old moving statistics when updating them.
    /// * `training` - Whether to use and accumulate batch statistics.
    ///
    /// # Returns
    /// A new `BatchNorm` instance.
    pub fn new(params: NormParams, eps: f32, decay: f32, training: bool) -> Self {
        Self {
            params,
            eps,
            decay,
            training,
            cache: None,
        }
    }

    pub fn forward(&mut self, params: &mut ParamStore, x: Array2<f32>) -> Result<Array2<f32>> {
        let NormParams {
            gamma,
            beta,
            moving_mean,
            moving_variance,
        } = self.params;

        let channels = params.get(moving_mean).len();
        if x.ncols() != channels {
            return Err(MlErr::SizeMismatch {
                what: "batch normalization channels",
                got: x.ncols(),
                expected: channels,
            });
        }

        let (mean, var) = match self.training {
            true => {
                let mean = x.mean_axis(Axis(0)).ok_or(MlErr::SizeMismatch {
                    what: "batch normalization input rows",
                    got: 0,
                    expected: 1,
                })?;
                let var = x.var_axis(Axis(0), 0.);

                let decay = self.decay;
                let fold = |moving: &mut f32, &batch: &f32| {
                    *moving = decay * *moving + (1. - decay) * batch
                };

                params
                    .get_mut(moving_mean)
                    .value_mut()
                    .view_mut()
                    .into_dimensionality::<Ix1>()?
                    .zip_mut_with(&mean, fold);
                params
                    .get_mut(moving_variance)
                    .value_mut()
                    .view_mut()
                    .into_dimensionality::<Ix1>()?
                    .zip_mut_with(&var, fold);

                (mean, var)
            }
            false => (
                params.view1(moving_mean)?.to_owned(),
                params.view1(moving_variance)?.to_owned(),
            ),
        };

        let eps = self.eps;
        let inv_std = var.mapv(|v| 1. / (v + eps).sqrt());
        let x_hat = (x - &mean) * &inv_std;
        let y = &x_hat * &params.view1(gamma)? + &params.view1(beta)?;

        self.cache = Some(NormCache { x_hat, inv_std });
        Ok(y)
    }

    pub fn backward(
        &mut self,
        params: &ParamStore,
        d: Array2<f32>,
        grads: &mut Gradients,
    ) -> Result<Array2<f32>> {
        let NormCache { x_hat, inv_std } = self.cache.take().ok_or(MlErr::MissingForwardPass {
            layer: "batch normalization",
        })?;
        let gamma = params.view1(self.params.gamma)?;

        grads.accumulate(self.params.gamma, (&d * &x_hat).sum_axis(Axis(0)).into_dyn());
        grads.accumulate(self.params.beta, d.sum_axis(Axis(0)).into_dyn());

        let dx_hat = d * &gamma;
        if !self.training {
            return Ok(dx_hat * &inv_std);
        }

        let n = dx_hat.nrows() as f32;
        let sum_dx_hat = dx_hat.sum_axis(Axis(0));
        let sum_dx_hat_x_hat = (&dx_hat * &x_hat).sum_axis(Axis(0));

        let dx = (dx_hat * n - &sum_dx_hat - &x_hat * &sum_dx_hat_x_hat) * &(inv_std / n);
        Ok(dx)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::params::{Param, ParamKind};

    fn layer(training: bool) -> (ParamStore, BatchNorm) {
        let mut store = ParamStore::new();
        let mut push = |name: &str, kind, fill| {
            store
                .push(Param::filled(name, kind, &[2], fill).unwrap())
                .unwrap()
        };

        let params = NormParams {
            gamma: push("bn/gamma", ParamKind::Gamma, 2.),
            beta: push("bn/beta", ParamKind::Beta, 1.),
            moving_mean: push("bn/moving_mean", ParamKind::MovingMean, 0.),
            moving_variance: push("bn/moving_variance", ParamKind::MovingVariance, 1.),
        };

        (store, BatchNorm::new(params, 0., 0.5, training))
    }

    #[test]
    fn frozen_statistics() {
        let (mut store, mut bn) = layer(false);
        let y = bn.forward(&mut store, array![[1., -1.], [0., 2.]]).unwrap();

        assert_eq!(y, array![[3f32, -1.], [1., 5.]]);
        assert_eq!(store.view1(bn.params.moving_mean).unwrap().sum(), 0.);

        let mut grads = Gradients::new(store.len());
        let dx = bn
            .backward(&store, array![[1., 1.], [1., 1.]], &mut grads)
            .unwrap();
        assert_eq!(dx, array![[2f32, 2.], [2., 2.]]);
    }

    #[test]
    fn batch_statistics_update_moving_ones() {
        let (mut store, mut bn) = layer(true);
        let y = bn.forward(&mut store, array![[1., 0.], [3., 4.]]).unwrap();

        // mean = [2, 2], var = [1, 4]
        assert_eq!(y, array![[-1f32, -1.], [3., 3.]]);
        assert_eq!(
            store.view1(bn.params.moving_mean).unwrap(),
            array![1f32, 1.]
        );
        assert_eq!(
            store.view1(bn.params.moving_variance).unwrap(),
            array![1f32, 2.5]
        );
    }

    #[test]
    fn batch_statistics_gradient_sums_to_zero() {
        let (mut store, mut bn) = layer(true);
        bn.forward(&mut store, array![[1., 4.], [3., 0.], [2., 5.]])
            .unwrap();

        let mut grads = Gradients::new(store.len());
        let dx = bn
            .backward(&store, array![[1., -2.], [0.5, 3.], [2., 0.]], &mut grads)
            .unwrap();

        for col in dx.axis_iter(Axis(1)) {
            assert!(col.sum().abs() < 1e-4);
        }
    }
}
