use ndarray::{ArrayD, ArrayView4};

use super::prepare_label;
use crate::{
    MlErr, Result,
    arch::{
        Model,
        loss::{L2, LossFn, WeightedSigmoidCrossEntropy},
    },
    params::{ParamGroup, ParamStore, Partition},
};

/// The weight of the positive pixels in the default loss.
pub const POS_WEIGHT: f32 = 5.;

/// The constant factor the mean data loss is scaled by.
pub const LOSS_SCALE: f32 = 20.;

/// The loss of a single training step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLoss {
    pub total: f32,
    /// The scaled classification term.
    pub data: f32,
    /// The weight decay term.
    pub l2: f32,
}

/// The gradients of a step split per variable group, each group ordered like its parameters in
/// the `Partition`.
#[derive(Debug, Clone)]
pub struct GroupGradients {
    groups: [Vec<ArrayD<f32>>; 3],
}

impl GroupGradients {
    pub fn group(&self, group: ParamGroup) -> &[ArrayD<f32>] {
        &self.groups[group.index()]
    }

    /// The euclidean norm of every gradient of `group` taken together.
    pub fn norm(&self, group: ParamGroup) -> f32 {
        self.group(group)
            .iter()
            .flat_map(|g| g.iter())
            .map(|g| g * g)
            .sum::<f32>()
            .sqrt()
    }

    /// Consumes the gradients, returning them indexed by `ParamGroup::index`.
    pub fn into_groups(self) -> [Vec<ArrayD<f32>>; 3] {
        self.groups
    }
}

impl From<[Vec<ArrayD<f32>>; 3]> for GroupGradients {
    fn from(groups: [Vec<ArrayD<f32>>; 3]) -> Self {
        Self { groups }
    }
}

/// Builds the objective of a step and differentiates it with respect to every variable group.
#[derive(Debug, Clone)]
pub struct LossComposer<L: LossFn> {
    loss_fn: L,
    loss_scale: f32,
    l2: L2,
}

impl LossComposer<WeightedSigmoidCrossEntropy> {
    /// Creates the default composer: sigmoid cross-entropy with positives weighted by
    /// `POS_WEIGHT` and its mean scaled by `LOSS_SCALE`.
    ///
    /// # Arguments
    /// * `weight_decay` - The factor of the L2 term.
    pub fn weighted_sigmoid(weight_decay: f32) -> Self {
        Self::new(
            WeightedSigmoidCrossEntropy::new(POS_WEIGHT),
            LOSS_SCALE,
            weight_decay,
        )
    }
}

impl<L: LossFn> LossComposer<L> {
    /// Creates a new `LossComposer`.
    ///
    /// # Arguments
    /// * `loss_fn` - The per-pixel classification loss.
    /// * `loss_scale` - The factor the mean classification loss is scaled by.
    /// * `weight_decay` - The factor of the L2 term.
    ///
    /// # Returns
    /// A new `LossComposer` instance.
    pub fn new(loss_fn: L, loss_scale: f32, weight_decay: f32) -> Self {
        Self {
            loss_fn,
            loss_scale,
            l2: L2::new(weight_decay),
        }
    }

    /// Runs the forward and backward passes of `model` over a batch.
    ///
    /// # Arguments
    /// * `model` - The network being trained.
    /// * `params` - The network's parameters.
    /// * `partition` - The variable groups of `params`.
    /// * `images` - A `(batch, height, width, channels)` tensor.
    /// * `labels` - A `(batch, height, width, 1)` tensor of binary masks.
    ///
    /// # Returns
    /// The loss of the batch and the gradients of every group, or an error if the shapes
    /// don't line up or the model left an optimized parameter without gradient.
    pub fn compute<M: Model>(
        &self,
        model: &mut M,
        params: &mut ParamStore,
        partition: &Partition,
        images: ArrayView4<f32>,
        labels: ArrayView4<u8>,
    ) -> Result<(StepLoss, GroupGradients)> {
        if images.dim().0 != labels.dim().0 {
            return Err(MlErr::SizeMismatch {
                what: "label batch",
                got: labels.dim().0,
                expected: images.dim().0,
            });
        }

        let scores = model.forward(params, images)?;
        let (n, h, w) = scores.dim();
        let labels = prepare_label(labels, h, w)?;

        let logits = scores.view().into_shape_with_order(n * h * w)?;
        let targets = labels.view().into_shape_with_order(n * h * w)?;

        let data = self.loss_scale * self.loss_fn.loss(logits, targets);
        let l2 = self.l2.penalty(params);

        let d_scores = (self.loss_fn.loss_prime(logits, targets) * self.loss_scale)
            .into_shape_with_order((n, h, w))?;

        let mut grads = model.backward(params, d_scores.view())?;
        self.l2.add_gradients(params, &mut grads);

        let mut concatenated = partition
            .concatenated()
            .into_iter()
            .map(|id| {
                grads.take(id).ok_or_else(|| MlErr::MissingGradient {
                    name: params.get(id).name().to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let [backbone, head, _] = partition.split(&concatenated)?.map(|group| group.len());
        let first_layer = concatenated.split_off(backbone + head);
        let head = concatenated.split_off(backbone);

        let loss = StepLoss {
            total: data + l2,
            data,
            l2,
        };

        Ok((
            loss,
            GroupGradients {
                groups: [concatenated, head, first_layer],
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array3, Array4, ArrayView3, ArrayView4, IxDyn, array};

    use super::*;
    use crate::params::{Gradients, Param, ParamKind};

    /// Returns fixed scores and a gradient of ones for every trainable parameter.
    struct FixedScores {
        scores: Array3<f32>,
    }

    impl Model for FixedScores {
        fn forward(&mut self, _: &mut ParamStore, _: ArrayView4<'_, f32>) -> Result<Array3<f32>> {
            Ok(self.scores.clone())
        }

        fn backward(&mut self, params: &ParamStore, _: ArrayView3<'_, f32>) -> Result<Gradients> {
            let mut grads = Gradients::new(params.len());
            for (id, p) in params.iter().filter(|(_, p)| p.kind().is_trainable()) {
                grads.accumulate(id, ArrayD::ones(IxDyn(p.shape())));
            }
            Ok(grads)
        }
    }

    fn store() -> ParamStore {
        let mut store = ParamStore::new();
        for (name, kind) in [
            ("conv1/weights", ParamKind::Weights),
            ("bn_conv1/gamma", ParamKind::Gamma),
            ("res2a/weights", ParamKind::Weights),
            ("res2b/weights", ParamKind::Weights),
            ("fc1/weights", ParamKind::Weights),
            ("fc1/biases", ParamKind::Biases),
        ] {
            store.push(Param::filled(name, kind, &[2], 1.).unwrap()).unwrap();
        }
        store
    }

    #[test]
    fn all_negative_labels() {
        let scores = array![[[-1f32, 0.], [2., 0.5]]];
        let mut model = FixedScores {
            scores: scores.clone(),
        };
        let mut params = store();
        let partition = Partition::new(&params).unwrap();
        let composer = LossComposer::weighted_sigmoid(0.);

        let images = Array4::zeros((1, 4, 4, 5));
        let labels = Array4::zeros((1, 4, 4, 1));
        let (loss, _) = composer
            .compute(&mut model, &mut params, &partition, images.view(), labels.view())
            .unwrap();

        let softplus = scores.mapv(|x: f32| x.exp().ln_1p()).mean().unwrap();
        assert!((loss.data - 20. * softplus).abs() < 1e-4);
        assert_eq!(loss.l2, 0.);
        assert_eq!(loss.total, loss.data);
    }

    #[test]
    fn gradients_follow_groups() {
        let mut model = FixedScores {
            scores: Array3::zeros((2, 2, 2)),
        };
        let mut params = store();
        let partition = Partition::new(&params).unwrap();
        let composer = LossComposer::weighted_sigmoid(0.5);

        let images = Array4::zeros((2, 4, 4, 5));
        let labels = Array4::ones((2, 4, 4, 1));
        let (loss, grads) = composer
            .compute(&mut model, &mut params, &partition, images.view(), labels.view())
            .unwrap();

        // four weight tensors of two ones each
        assert_eq!(loss.l2, 0.5 * 4.);
        assert_eq!(loss.total, loss.data + loss.l2);

        for group in ParamGroup::ALL {
            assert_eq!(grads.group(group).len(), partition.group(group).len());
        }

        // weights get 1 + 0.5 * 1, biases only the data gradient
        assert_eq!(grads.group(ParamGroup::Backbone)[0].as_slice().unwrap(), &[1.5f32, 1.5]);
        assert_eq!(grads.group(ParamGroup::Head)[1].as_slice().unwrap(), &[1f32, 1.]);
        assert!((grads.norm(ParamGroup::FirstLayer) - (2f32 * 1.5 * 1.5).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn missing_gradient_is_an_error() {
        struct NoGrads;

        impl Model for NoGrads {
            fn forward(&mut self, _: &mut ParamStore, _: ArrayView4<'_, f32>) -> Result<Array3<f32>> {
                Ok(Array3::zeros((1, 1, 1)))
            }

            fn backward(&mut self, params: &ParamStore, _: ArrayView3<'_, f32>) -> Result<Gradients> {
                Ok(Gradients::new(params.len()))
            }
        }

        let mut params = store();
        let partition = Partition::new(&params).unwrap();
        let composer = LossComposer::weighted_sigmoid(0.);

        let images = Array4::zeros((1, 1, 1, 5));
        let labels = Array4::zeros((1, 1, 1, 1));
        let result = composer.compute(&mut NoGrads, &mut params, &partition, images.view(), labels.view());
        assert!(matches!(result, Err(MlErr::MissingGradient { .. })));
    }
}
