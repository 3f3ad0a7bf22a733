use std::fmt;

use ndarray::{ErrorKind, ShapeError};
use rayon::prelude::*;

use super::{GradientDescentWithMomentum, Optimizer, PolyDecay};
use crate::{
    MlErr, Result,
    params::{ParamGroup, ParamStore, Partition},
    training::GroupGradients,
};

/// The hyperparameters of the optimizers, before they know which parameters they will update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumConfig {
    /// The learning rate of the backbone at step 0.
    pub learning_rate: f32,
    pub momentum: f32,
    /// The base of the learning rate decay.
    pub power: f32,
}

impl MomentumConfig {
    /// Builds one momentum optimizer per variable group, with a zeroed velocity for each of its
    /// parameters.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `partition` - The variable groups of `params`.
    /// * `total_steps` - The amount of steps of the whole run.
    ///
    /// # Returns
    /// A new `MultiGroupOptimizer` or an error if `total_steps` is zero.
    pub fn init(
        self,
        params: &ParamStore,
        partition: &Partition,
        total_steps: usize,
    ) -> Result<MultiGroupOptimizer> {
        let schedule = PolyDecay::new(self.learning_rate, self.power, total_steps)?;

        let groups = ParamGroup::ALL
            .iter()
            .map(|&group| {
                let lr = self.learning_rate * group.lr_multiplier();
                partition
                    .group(group)
                    .iter()
                    .map(|&id| GradientDescentWithMomentum::new(params.get(id).len(), lr, self.momentum))
                    .collect()
            })
            .collect();

        Ok(MultiGroupOptimizer { schedule, groups })
    }
}

/// The learning rate of each variable group at some step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupRates {
    pub backbone: f32,
    pub head: f32,
    pub first_layer: f32,
}

impl GroupRates {
    pub fn get(&self, group: ParamGroup) -> f32 {
        match group {
            ParamGroup::Backbone => self.backbone,
            ParamGroup::Head => self.head,
            ParamGroup::FirstLayer => self.first_layer,
        }
    }
}

impl fmt::Display for GroupRates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "backbone={:e} head={:e} first_layer={:e}",
            self.backbone, self.head, self.first_layer
        )
    }
}

/// Three momentum optimizers, one per variable group, driven by a single decayed learning rate
/// scaled by each group's multiplier.
///
/// Every parameter keeps its own velocity across steps.
#[derive(Debug)]
pub struct MultiGroupOptimizer {
    schedule: PolyDecay,
    groups: Vec<Vec<GradientDescentWithMomentum>>,
}

impl MultiGroupOptimizer {
    /// The learning rates used at `step`.
    pub fn rates(&self, step: usize) -> GroupRates {
        let lr = self.schedule.learning_rate(step);
        GroupRates {
            backbone: lr * ParamGroup::Backbone.lr_multiplier(),
            head: lr * ParamGroup::Head.lr_multiplier(),
            first_layer: lr * ParamGroup::FirstLayer.lr_multiplier(),
        }
    }

    pub fn total_steps(&self) -> usize {
        self.schedule.total_steps()
    }

    /// Applies the gradients of one step to every variable group, the three groups are updated
    /// in parallel.
    ///
    /// # Arguments
    /// * `step` - The index of the current step.
    /// * `params` - The model's parameters.
    /// * `partition` - The variable groups of `params`, the one this optimizer was built from.
    /// * `grads` - The gradients of the step.
    ///
    /// # Returns
    /// The learning rates used or an error if the gradients don't match the parameters.
    pub fn step(
        &mut self,
        step: usize,
        params: &mut ParamStore,
        partition: &Partition,
        grads: GroupGradients,
    ) -> Result<GroupRates> {
        let rates = self.rates(step);
        for (optimizers, group) in self.groups.iter_mut().zip(ParamGroup::ALL) {
            let lr = rates.get(group);
            optimizers.iter_mut().for_each(|o| o.set_learning_rate(lr));
        }

        let values = params.groups_mut(partition)?;
        let grads = Vec::from(grads.into_groups());

        self.groups
            .par_iter_mut()
            .zip(values.into_par_iter())
            .zip(grads.into_par_iter())
            .try_for_each(|((optimizers, values), grads)| {
                if optimizers.len() != values.len() || grads.len() != values.len() {
                    return Err(MlErr::SizeMismatch {
                        what: "group gradients",
                        got: grads.len(),
                        expected: optimizers.len(),
                    });
                }

                for ((optimizer, value), grad) in optimizers.iter_mut().zip(values).zip(&grads) {
                    let grad = grad.as_standard_layout();
                    let grad = grad.as_slice().ok_or_else(incompatible_layout)?;
                    let value = value.as_slice_mut().ok_or_else(incompatible_layout)?;
                    optimizer.update_params(grad, value)?;
                }

                Ok(())
            })?;

        Ok(rates)
    }
}

fn incompatible_layout() -> MlErr {
    MlErr::Shape(ShapeError::from_kind(ErrorKind::IncompatibleLayout))
}
