use std::{cell::RefCell, rc::Rc};

use ndarray::{Array2, Array3, ArrayView3, ArrayView4, s};
use rand::Rng;

use super::{
    Model,
    layers::{BatchNorm, Layer, NormParams, Pointwise, Relu, backward_all, forward_all},
};
use crate::{
    MlErr, Result,
    initialization::{ConstParamGen, ParamGen, RandParamGen},
    params::{Gradients, Param, ParamId, ParamKind, ParamStore},
};

/// The shape of a `SegNet`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegNetConfig {
    /// Channels of the input images, 5 for RGB plus positive and negative click maps.
    pub in_channels: usize,
    pub hidden_channels: usize,
    pub residual_blocks: usize,
    /// Sub-sampling factor between the input and the score map.
    pub output_stride: usize,
    /// Whether batch normalization uses and updates batch statistics.
    pub training: bool,
    pub bn_eps: f32,
    pub bn_decay: f32,
}

impl Default for SegNetConfig {
    fn default() -> Self {
        Self {
            in_channels: 5,
            hidden_channels: 32,
            residual_blocks: 2,
            output_stride: 8,
            training: false,
            bn_eps: 1e-5,
            bn_decay: 0.999,
        }
    }
}

/// `x -> relu(x + bn(conv(x)))`
#[derive(Debug, Clone)]
struct ResidualBlock {
    branch: Vec<Layer>,
    relu: Relu,
}

impl ResidualBlock {
    fn forward(&mut self, params: &mut ParamStore, x: Array2<f32>) -> Result<Array2<f32>> {
        let z = forward_all(&mut self.branch, params, x.clone())?;
        Ok(self.relu.forward(x + z))
    }

    fn backward(
        &mut self,
        params: &ParamStore,
        d: Array2<f32>,
        grads: &mut Gradients,
    ) -> Result<Array2<f32>> {
        let d = self.relu.backward(d)?;
        let d_branch = backward_all(&mut self.branch, params, d.clone(), grads)?;
        Ok(d + d_branch)
    }
}

/// A small residual segmentation network made of 1x1 convolutions.
///
/// Parameters follow the DeepLab naming convention (`conv1`, `bn_conv1`, `res2a_branch2a`,
/// `fc1_voc12_c0`, ...) so that each of them lands in the right variable group.
#[derive(Debug, Clone)]
pub struct SegNet {
    config: SegNetConfig,
    stem: Vec<Layer>,
    blocks: Vec<ResidualBlock>,
    head: Pointwise,

    // Forward metadata
    out_dim: Option<(usize, usize, usize)>,
}

impl SegNet {
    /// Creates a new `SegNet`, registering and initializing its parameters.
    ///
    /// # Arguments
    /// * `config` - The shape of the network.
    /// * `params` - The store where the parameters get registered.
    /// * `rng` - The random number generator used for the initial weights.
    ///
    /// # Returns
    /// A new `SegNet` instance or an error if the config is invalid.
    pub fn new<R: Rng>(
        config: SegNetConfig,
        params: &mut ParamStore,
        rng: Rc<RefCell<R>>,
    ) -> Result<Self> {
        let SegNetConfig {
            in_channels,
            hidden_channels: k,
            residual_blocks,
            output_stride,
            training,
            bn_eps,
            bn_decay,
        } = config;

        if in_channels == 0 || k == 0 || output_stride == 0 {
            return Err(MlErr::InvalidInit(format!(
                "channels and output stride must be positive, got {config:?}"
            )));
        }

        let conv1 = kaiming(params, &rng, "conv1/weights", in_channels, k)?;
        let stem = vec![
            Layer::Pointwise(Pointwise::new(conv1, None)),
            Layer::BatchNorm(BatchNorm::new(
                norm_params(params, "bn_conv1", k)?,
                bn_eps,
                bn_decay,
                training,
            )),
            Layer::Relu(Relu::new()),
        ];

        let blocks = (0..residual_blocks)
            .map(|i| -> Result<ResidualBlock> {
                let stage = i + 2;
                let weights = kaiming(params, &rng, &format!("res{stage}a_branch2a/weights"), k, k)?;
                let branch = vec![
                    Layer::Pointwise(Pointwise::new(weights, None)),
                    Layer::BatchNorm(BatchNorm::new(
                        norm_params(params, &format!("bn{stage}a_branch2a"), k)?,
                        bn_eps,
                        bn_decay,
                        training,
                    )),
                ];

                Ok(ResidualBlock {
                    branch,
                    relu: Relu::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let head_weights = RandParamGen::normal(rng, k, 0., 0.01)?.tensor(&[k, 1])?;
        let head_weights = params.push(Param::new(
            "fc1_voc12_c0/weights",
            ParamKind::Weights,
            head_weights,
        )?)?;
        let head_biases = ConstParamGen::new(0., 1).tensor(&[1])?;
        let head_biases =
            params.push(Param::new("fc1_voc12_c0/biases", ParamKind::Biases, head_biases)?)?;

        Ok(Self {
            config,
            stem,
            blocks,
            head: Pointwise::new(head_weights, Some(head_biases)),
            out_dim: None,
        })
    }

    /// Returns the `(batch, height, width)` of the scores for an input of the given size.
    pub fn output_dim(&self, batch: usize, height: usize, width: usize) -> (usize, usize, usize) {
        let stride = self.config.output_stride;
        (batch, height.div_ceil(stride), width.div_ceil(stride))
    }
}

impl Model for SegNet {
    fn forward(&mut self, params: &mut ParamStore, images: ArrayView4<'_, f32>) -> Result<Array3<f32>> {
        let (n, h, w, c) = images.dim();
        if c != self.config.in_channels {
            return Err(MlErr::SizeMismatch {
                what: "input channels",
                got: c,
                expected: self.config.in_channels,
            });
        }

        let stride = self.config.output_stride;
        let (_, oh, ow) = self.output_dim(n, h, w);
        let x = images
            .slice(s![.., ..;stride, ..;stride, ..])
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((n * oh * ow, c))?;

        let mut x = forward_all(&mut self.stem, params, x)?;
        for block in &mut self.blocks {
            x = block.forward(params, x)?;
        }
        let scores = self.head.forward(params, x)?;

        self.out_dim = Some((n, oh, ow));
        Ok(scores.into_shape_with_order((n, oh, ow))?)
    }

    fn backward(&mut self, params: &ParamStore, d_scores: ArrayView3<'_, f32>) -> Result<Gradients> {
        let (n, oh, ow) = self
            .out_dim
            .take()
            .ok_or(MlErr::MissingForwardPass { layer: "segnet" })?;

        if d_scores.dim() != (n, oh, ow) {
            return Err(MlErr::SizeMismatch {
                what: "score gradient",
                got: d_scores.len(),
                expected: n * oh * ow,
            });
        }

        let mut grads = Gradients::new(params.len());
        let d = d_scores
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((n * oh * ow, 1))?;

        let mut d = self.head.backward(params, d, &mut grads)?;
        for block in self.blocks.iter_mut().rev() {
            d = block.backward(params, d, &mut grads)?;
        }
        backward_all(&mut self.stem, params, d, &mut grads)?;

        Ok(grads)
    }
}

fn kaiming<R: Rng>(
    params: &mut ParamStore,
    rng: &Rc<RefCell<R>>,
    name: &str,
    fan_in: usize,
    fan_out: usize,
) -> Result<ParamId> {
    let value = RandParamGen::kaiming(Rc::clone(rng), fan_in * fan_out, fan_in)?
        .tensor(&[fan_in, fan_out])?;
    params.push(Param::new(name, ParamKind::Weights, value)?)
}

fn norm_params(params: &mut ParamStore, prefix: &str, channels: usize) -> Result<NormParams> {
    let mut push = |suffix: &str, kind: ParamKind, fill: f32| -> Result<ParamId> {
        let value = ConstParamGen::new(fill, channels).tensor(&[channels])?;
        params.push(Param::new(format!("{prefix}/{suffix}"), kind, value)?)
    };

    Ok(NormParams {
        gamma: push("gamma", ParamKind::Gamma, 1.)?,
        beta: push("beta", ParamKind::Beta, 0.)?,
        moving_mean: push("moving_mean", ParamKind::MovingMean, 0.)?,
        moving_variance: push("moving_variance", ParamKind::MovingVariance, 1.)?,
    })
}

#[cfg(test)]
mod tests {
    use ndarray::{Array3, Array4, ArrayD, IxDyn};
    use rand::{SeedableRng, rngs::StdRng};
    use rand_distr::{Distribution, Normal};

    use super::*;
    use crate::params::{ParamGroup, Partition};

    const CONFIG: SegNetConfig = SegNetConfig {
        in_channels: 3,
        hidden_channels: 4,
        residual_blocks: 1,
        output_stride: 2,
        training: false,
        bn_eps: 1e-5,
        bn_decay: 0.9,
    };

    fn build(config: SegNetConfig) -> (SegNet, ParamStore, Rc<RefCell<StdRng>>) {
        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(7)));
        let mut params = ParamStore::new();
        let net = SegNet::new(config, &mut params, Rc::clone(&rng)).unwrap();
        (net, params, rng)
    }

    fn random(shape: &[usize], rng: &Rc<RefCell<StdRng>>) -> ArrayD<f32> {
        let normal = Normal::new(0f32, 1.).unwrap();
        let mut rng = rng.borrow_mut();
        let values = (0..shape.iter().product()).map(|_| normal.sample(&mut *rng));
        ArrayD::from_shape_vec(IxDyn(shape), values.collect()).unwrap()
    }

    #[test]
    fn params_follow_naming_convention() {
        let (_, params, _) = build(CONFIG);
        let partition = Partition::new(&params).unwrap();

        let names = |group: ParamGroup| -> Vec<String> {
            partition
                .group(group)
                .iter()
                .map(|&id| params.get(id).name().to_string())
                .collect()
        };

        assert_eq!(names(ParamGroup::FirstLayer), ["conv1/weights"]);
        assert_eq!(names(ParamGroup::Backbone), ["res2a_branch2a/weights"]);
        assert_eq!(
            names(ParamGroup::Head),
            ["fc1_voc12_c0/weights", "fc1_voc12_c0/biases"]
        );
        assert_eq!(partition.excluded().len(), 4);
    }

    #[test]
    fn output_is_subsampled() {
        let (mut net, mut params, _) = build(CONFIG);

        for (size, out) in [(4, 2), (5, 3)] {
            let images = Array4::<f32>::zeros((2, size, size, 3));
            let scores = net.forward(&mut params, images.view()).unwrap();
            assert_eq!(scores.dim(), (2, out, out));
            assert_eq!(net.output_dim(2, size, size), (2, out, out));
        }
    }

    #[test]
    fn wrong_channels() {
        let (mut net, mut params, _) = build(CONFIG);
        let images = Array4::<f32>::zeros((1, 4, 4, 5));
        assert!(net.forward(&mut params, images.view()).is_err());
    }

    #[test]
    fn every_trainable_param_gets_a_gradient() {
        for training in [false, true] {
            let (mut net, mut params, rng) = build(SegNetConfig { training, ..CONFIG });
            let images: Array4<f32> = random(&[2, 4, 4, 3], &rng).into_dimensionality().unwrap();

            let scores = net.forward(&mut params, images.view()).unwrap();
            let grads = net
                .backward(&params, Array3::ones(scores.dim()).view())
                .unwrap();

            let trainable = params.iter().filter(|(_, p)| p.kind().is_trainable()).count();
            assert_eq!(grads.count(), trainable);

            for (id, p) in params.iter() {
                if let Some(g) = grads.get(id) {
                    assert_eq!(g.shape(), p.shape());
                }
            }
        }
    }

    #[test]
    fn head_gradient_matches_finite_differences() {
        const EPS: f32 = 1e-2;

        let (mut net, mut params, rng) = build(CONFIG);
        let images: Array4<f32> = random(&[1, 4, 4, 3], &rng).into_dimensionality().unwrap();
        let r: Array3<f32> = random(&[1, 2, 2], &rng).into_dimensionality().unwrap();

        // L = sum(scores * r), so dL/dscores = r.
        let loss = |net: &mut SegNet, params: &mut ParamStore| {
            let scores = net.forward(params, images.view()).unwrap();
            (&scores * &r).sum()
        };

        loss(&mut net, &mut params);
        let grads = net.backward(&params, r.view()).unwrap();

        let weights = params.find("fc1_voc12_c0/weights").unwrap();
        let analytic = grads.get(weights).unwrap().clone();

        for i in 0..analytic.len() {
            params.get_mut(weights).value_mut().as_slice_mut().unwrap()[i] += EPS;
            let plus = loss(&mut net, &mut params);
            params.get_mut(weights).value_mut().as_slice_mut().unwrap()[i] -= 2. * EPS;
            let minus = loss(&mut net, &mut params);
            params.get_mut(weights).value_mut().as_slice_mut().unwrap()[i] += EPS;

            let numeric = (plus - minus) / (2. * EPS);
            let expected = analytic.as_slice().unwrap()[i];
            assert!(
                (numeric - expected).abs() <= 1e-2 * expected.abs().max(1.),
                "weight {i}: numeric {numeric} analytic {expected}"
            );
        }
    }
}
