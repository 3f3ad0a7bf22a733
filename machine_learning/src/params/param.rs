use std::fmt;

use ndarray::{ArrayD, IxDyn};

use crate::{MlErr, Result};

/// Substring that marks a parameter as part of the output head.
pub const HEAD_MARKER: &str = "fc";

/// Substring that marks a parameter as part of the first convolution.
pub const FIRST_LAYER_MARKER: &str = "conv1";

/// What a parameter is used for inside its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Weights,
    Biases,
    /// Normalization scale.
    Gamma,
    /// Normalization offset.
    Beta,
    MovingMean,
    MovingVariance,
}

impl ParamKind {
    /// Whether the parameter receives gradients at all.
    pub fn is_trainable(self) -> bool {
        !matches!(self, ParamKind::MovingMean | ParamKind::MovingVariance)
    }

    /// Whether the parameter is a normalization scale or offset. These are trainable but are
    /// left out of every variable group.
    pub fn is_normalization(self) -> bool {
        matches!(self, ParamKind::Gamma | ParamKind::Beta)
    }

    /// Whether the parameter is subject to L2 regularization.
    pub fn is_regularized(self) -> bool {
        self == ParamKind::Weights
    }

    /// Whether the parameter is updated by the optimizer.
    pub fn is_optimized(self) -> bool {
        self.is_trainable() && !self.is_normalization()
    }
}

/// The variable group a parameter belongs to, each group has its own learning rate multiplier.
///
/// The declaration order is the order in which the groups are concatenated when differentiating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamGroup {
    Backbone,
    Head,
    FirstLayer,
}

impl ParamGroup {
    /// Every group, in concatenation order.
    pub const ALL: [ParamGroup; 3] = [ParamGroup::Backbone, ParamGroup::Head, ParamGroup::FirstLayer];

    /// Returns the position of this group in the concatenation order.
    pub fn index(self) -> usize {
        match self {
            ParamGroup::Backbone => 0,
            ParamGroup::Head => 1,
            ParamGroup::FirstLayer => 2,
        }
    }

    /// Returns the multiplier applied to the global learning rate for this group.
    pub fn lr_multiplier(self) -> f32 {
        match self {
            ParamGroup::Backbone => 1.0,
            ParamGroup::Head => 5.0,
            ParamGroup::FirstLayer => 5.0,
        }
    }

    /// Derives the group of a parameter from the naming convention of the network.
    ///
    /// # Arguments
    /// * `name` - The full name of the parameter.
    ///
    /// # Returns
    /// The group or an error if the name matches more than one marker.
    pub fn from_name(name: &str) -> Result<Self> {
        match (name.contains(HEAD_MARKER), name.contains(FIRST_LAYER_MARKER)) {
            (true, true) => Err(MlErr::AmbiguousGroup {
                name: name.to_string(),
            }),
            (true, false) => Ok(ParamGroup::Head),
            (false, true) => Ok(ParamGroup::FirstLayer),
            (false, false) => Ok(ParamGroup::Backbone),
        }
    }
}

impl fmt::Display for ParamGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamGroup::Backbone => "backbone",
            ParamGroup::Head => "head",
            ParamGroup::FirstLayer => "first_layer",
        };

        f.write_str(s)
    }
}

/// A named tensor of the model.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    kind: ParamKind,
    group: Option<ParamGroup>,
    value: ArrayD<f32>,
}

impl Param {
    /// Creates a new `Param`, tagging it with its variable group.
    ///
    /// Parameters the optimizer updates get their group from the naming convention, the rest
    /// are left untagged.
    ///
    /// # Arguments
    /// * `name` - The unique name of the parameter.
    /// * `kind` - What the parameter is used for.
    /// * `value` - The initial value.
    ///
    /// # Returns
    /// A new `Param` instance or an error if its name is ambiguous.
    pub fn new(name: impl Into<String>, kind: ParamKind, value: ArrayD<f32>) -> Result<Self> {
        let name = name.into();
        let group = match kind.is_optimized() {
            true => Some(ParamGroup::from_name(&name)?),
            false => None,
        };

        Ok(Self::tagged(name, kind, group, value))
    }

    /// Creates a new `Param` with an explicit group tag.
    pub fn tagged(
        name: impl Into<String>,
        kind: ParamKind,
        group: Option<ParamGroup>,
        value: ArrayD<f32>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            group,
            value: value.as_standard_layout().into_owned(),
        }
    }

    /// Creates a new `Param` filled with `fill`.
    pub fn filled(name: impl Into<String>, kind: ParamKind, shape: &[usize], fill: f32) -> Result<Self> {
        Self::new(name, kind, ArrayD::from_elem(IxDyn(shape), fill))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn group(&self) -> Option<ParamGroup> {
        self.group
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.value
    }

    /// Replaces the value, the new one must have the same shape.
    pub fn assign(&mut self, value: ArrayD<f32>) -> Result<()> {
        if value.shape() != self.value.shape() {
            return Err(MlErr::SizeMismatch {
                what: "parameter shape",
                got: value.len(),
                expected: self.value.len(),
            });
        }

        self.value = value.as_standard_layout().into_owned();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_from_name() {
        assert_eq!(ParamGroup::from_name("fc1_voc12_c0/weights").unwrap(), ParamGroup::Head);
        assert_eq!(ParamGroup::from_name("conv1/weights").unwrap(), ParamGroup::FirstLayer);
        assert_eq!(ParamGroup::from_name("res2a_branch1/weights").unwrap(), ParamGroup::Backbone);
        assert!(matches!(
            ParamGroup::from_name("fc_conv1/weights"),
            Err(MlErr::AmbiguousGroup { .. })
        ));
    }

    #[test]
    fn only_optimized_params_are_tagged() {
        let gamma = Param::filled("bn_conv1/gamma", ParamKind::Gamma, &[4], 1.).unwrap();
        let mean = Param::filled("bn_conv1/moving_mean", ParamKind::MovingMean, &[4], 0.).unwrap();
        let weights = Param::filled("conv1/weights", ParamKind::Weights, &[5, 4], 0.).unwrap();

        assert_eq!(gamma.group(), None);
        assert_eq!(mean.group(), None);
        assert_eq!(weights.group(), Some(ParamGroup::FirstLayer));
    }

    #[test]
    fn normalization_params_skip_the_name_check() {
        // Would be ambiguous if it were optimized.
        let beta = Param::filled("fc_conv1/beta", ParamKind::Beta, &[2], 0.);
        assert!(beta.is_ok());
    }

    #[test]
    fn assign_checks_shape() {
        let mut p = Param::filled("res2a/weights", ParamKind::Weights, &[2, 2], 0.).unwrap();
        assert!(p.assign(ArrayD::zeros(IxDyn(&[4]))).is_err());
        assert!(p.assign(ArrayD::ones(IxDyn(&[2, 2]))).is_ok());
        assert_eq!(p.value().sum(), 4.);
    }
}
