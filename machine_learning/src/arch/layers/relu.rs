use ndarray::Array2;

use crate::{MlErr, Result};

/// Rectified linear unit.
#[derive(Debug, Clone, Default)]
pub struct Relu {
    a: Option<Array2<f32>>,
}

impl Relu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, z: Array2<f32>) -> Array2<f32> {
        let a = z.mapv_into(|z| z.max(0.));
        self.a = Some(a.clone());
        a
    }

    pub fn backward(&mut self, mut d: Array2<f32>) -> Result<Array2<f32>> {
        let a = self
            .a
            .take()
            .ok_or(MlErr::MissingForwardPass { layer: "relu" })?;

        d.zip_mut_with(&a, |d, &a| {
            if a <= 0. {
                *d = 0.;
            }
        });

        Ok(d)
    }
}
