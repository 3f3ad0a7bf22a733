use super::{ParamGroup, ParamId, ParamStore};
use crate::{MlErr, Result};

/// The split of a model's trainable parameters into the three variable groups.
///
/// Normalization scales and offsets are trainable but excluded from every group, so the optimizer
/// never updates them. Built once at startup, it fails if any optimized parameter lacks a group.
/// `Partition::check` verifies the group sizes against a store before it is updated.
#[derive(Debug, Clone)]
pub struct Partition {
    groups: [Vec<ParamId>; 3],
    excluded: Vec<ParamId>,
    group_of: Vec<Option<ParamGroup>>,
}

impl Partition {
    /// Partitions the parameters of `store` by their group tags.
    ///
    /// # Arguments
    /// * `store` - The model's parameters.
    ///
    /// # Returns
    /// A new `Partition` or an error if the tags are inconsistent with the parameter kinds.
    pub fn new(store: &ParamStore) -> Result<Self> {
        let mut groups: [Vec<ParamId>; 3] = Default::default();
        let mut excluded = Vec::new();
        let mut group_of = vec![None; store.len()];

        for (id, param) in store.iter() {
            let kind = param.kind();

            if !kind.is_optimized() {
                if param.group().is_some() {
                    return Err(MlErr::UnexpectedTag {
                        name: param.name().to_string(),
                    });
                }
                if kind.is_trainable() {
                    excluded.push(id);
                }
                continue;
            }

            let Some(group) = param.group() else {
                return Err(MlErr::UntaggedParam {
                    name: param.name().to_string(),
                });
            };

            groups[group.index()].push(id);
            group_of[id.index()] = Some(group);
        }

        Ok(Self {
            groups,
            excluded,
            group_of,
        })
    }

    /// Checks that the groups hold exactly the trainable parameters of `store` minus the
    /// normalization ones.
    ///
    /// # Arguments
    /// * `store` - The parameters about to be updated through this partition.
    ///
    /// # Returns
    /// An error if the amounts differ.
    pub fn check(&self, store: &ParamStore) -> Result<()> {
        let kinds = || store.iter().map(|(_, p)| p.kind());
        let trainable = kinds().filter(|k| k.is_trainable()).count();
        let normalization = kinds().filter(|k| k.is_normalization()).count();

        let grouped = self.len();
        let expected = trainable - normalization;
        if grouped != expected {
            return Err(MlErr::PartitionMismatch { grouped, expected });
        }

        Ok(())
    }

    /// Returns the parameters of `group`, in registration order.
    pub fn group(&self, group: ParamGroup) -> &[ParamId] {
        &self.groups[group.index()]
    }

    /// Returns the normalization parameters left out of every group.
    pub fn excluded(&self) -> &[ParamId] {
        &self.excluded
    }

    /// Returns the group of a parameter, if it has one.
    pub fn group_of(&self, id: ParamId) -> Option<ParamGroup> {
        self.group_of.get(id.index()).copied().flatten()
    }

    /// Returns the amount of parameters of each group, in concatenation order.
    pub fn sizes(&self) -> [usize; 3] {
        [
            self.groups[0].len(),
            self.groups[1].len(),
            self.groups[2].len(),
        ]
    }

    /// Amount of parameters across all groups.
    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every grouped parameter as `backbone ++ head ++ first_layer`.
    pub fn concatenated(&self) -> Vec<ParamId> {
        self.groups.iter().flatten().copied().collect()
    }

    /// Splits a list that follows the concatenation order back into one slice per group.
    ///
    /// # Arguments
    /// * `items` - One item per grouped parameter, ordered like `concatenated`.
    ///
    /// # Returns
    /// The slices, indexed by `ParamGroup::index`, or an error if `items` has the wrong length.
    pub fn split<'a, T>(&self, items: &'a [T]) -> Result<[&'a [T]; 3]> {
        if items.len() != self.len() {
            return Err(MlErr::SizeMismatch {
                what: "concatenated variable groups",
                got: items.len(),
                expected: self.len(),
            });
        }

        let [backbone, head, _] = self.sizes();
        let (backbone_items, rest) = items.split_at(backbone);
        let (head_items, first_layer_items) = rest.split_at(head);
        Ok([backbone_items, head_items, first_layer_items])
    }
}
