use std::collections::HashMap;

use ndarray::{ArrayD, ArrayView1, ArrayView2, Ix1, Ix2};

use super::{Param, Partition};
use crate::{MlErr, Result};

/// The handle of a parameter inside a `ParamStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(usize);

impl ParamId {
    /// Returns the registration index of the parameter.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Owns every parameter of a model, trainable or not, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    params: Vec<Param>,
    index: HashMap<String, ParamId>,
}

impl ParamStore {
    /// Creates a new empty `ParamStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new parameter.
    ///
    /// # Arguments
    /// * `param` - The parameter to register.
    ///
    /// # Returns
    /// The handle of the parameter or an error if the name is already taken.
    pub fn push(&mut self, param: Param) -> Result<ParamId> {
        if self.index.contains_key(param.name()) {
            return Err(MlErr::DuplicateParam {
                name: param.name().to_string(),
            });
        }

        let id = ParamId(self.params.len());
        self.index.insert(param.name().to_string(), id);
        self.params.push(param);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the parameter behind `id`.
    ///
    /// # Panics
    /// If `id` was not produced by this store.
    pub fn get(&self, id: ParamId) -> &Param {
        &self.params[id.0]
    }

    /// Returns the parameter behind `id` mutably.
    ///
    /// # Panics
    /// If `id` was not produced by this store.
    pub fn get_mut(&mut self, id: ParamId) -> &mut Param {
        &mut self.params[id.0]
    }

    /// Looks a parameter up by name.
    pub fn find(&self, name: &str) -> Option<ParamId> {
        self.index.get(name).copied()
    }

    /// Iterates every parameter in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &Param)> {
        self.params.iter().enumerate().map(|(i, p)| (ParamId(i), p))
    }

    /// Iterates every parameter mutably in registration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ParamId, &mut Param)> {
        self.params.iter_mut().enumerate().map(|(i, p)| (ParamId(i), p))
    }

    /// Total amount of scalars held by the store.
    pub fn num_scalars(&self) -> usize {
        self.params.iter().map(Param::len).sum()
    }

    /// Views a parameter as a matrix.
    pub fn view2(&self, id: ParamId) -> Result<ArrayView2<'_, f32>> {
        Ok(self.get(id).value().view().into_dimensionality::<Ix2>()?)
    }

    /// Views a parameter as a vector.
    pub fn view1(&self, id: ParamId) -> Result<ArrayView1<'_, f32>> {
        Ok(self.get(id).value().view().into_dimensionality::<Ix1>()?)
    }

    /// Splits the store into one list of mutable values per variable group, each list follows
    /// the order of its group in `partition`.
    ///
    /// # Arguments
    /// * `partition` - A partition built from this store.
    ///
    /// # Returns
    /// The values, indexed by `ParamGroup::index`, or an error if the partition doesn't belong
    /// to this store.
    pub fn groups_mut(&mut self, partition: &Partition) -> Result<Vec<Vec<&mut ArrayD<f32>>>> {
        partition.check(self)?;

        let mut groups: Vec<Vec<&mut ArrayD<f32>>> = partition
            .sizes()
            .iter()
            .map(|&size| Vec::with_capacity(size))
            .collect();

        for (id, param) in self.iter_mut() {
            if let Some(group) = partition.group_of(id) {
                groups[group.index()].push(param.value_mut());
            }
        }

        for (values, &expected) in groups.iter().zip(partition.sizes().iter()) {
            if values.len() != expected {
                return Err(MlErr::SizeMismatch {
                    what: "variable group",
                    got: values.len(),
                    expected,
                });
            }
        }

        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamKind;

    #[test]
    fn push_and_find() {
        let mut store = ParamStore::new();
        let a = store
            .push(Param::filled("conv1/weights", ParamKind::Weights, &[3, 2], 0.5).unwrap())
            .unwrap();
        let b = store
            .push(Param::filled("fc1_voc12/biases", ParamKind::Biases, &[1], 0.).unwrap())
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.find("conv1/weights"), Some(a));
        assert_eq!(store.find("fc1_voc12/biases"), Some(b));
        assert_eq!(store.find("nope"), None);
        assert_eq!(store.num_scalars(), 7);
        assert_eq!(store.view2(a).unwrap().dim(), (3, 2));
        assert!(store.view1(a).is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut store = ParamStore::new();
        let p = Param::filled("res2a/weights", ParamKind::Weights, &[1], 0.).unwrap();
        store.push(p.clone()).unwrap();
        assert!(matches!(store.push(p), Err(MlErr::DuplicateParam { .. })));
    }
}
