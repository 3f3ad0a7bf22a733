use crate::Result;

/// An algorithm that updates a flat slice of parameters given its gradient.
pub trait Optimizer {
    /// Takes one step.
    ///
    /// # Arguments
    /// * `grad` - The gradient of the parameters.
    /// * `params` - The parameters that are going to be modified.
    ///
    /// # Returns
    /// An error if the sizes of `grad` and `params` differ.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;

    /// Changes the length of the steps taken from now on.
    fn set_learning_rate(&mut self, learning_rate: f32);
}
