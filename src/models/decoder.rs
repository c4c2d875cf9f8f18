use crate::layers::LinearT;
use crate::math::Matrix;

/// Generative network scoring an input batch under a latent code.
pub trait Decoder {
    type Input;

    /// Per-example reconstruction error (negative log-likelihood) of `x`
    /// given one latent sample per example.  Inference path, no caches.
    fn reconstruct_error(&self, x: &Self::Input, z: &Matrix) -> Vec<f32>;

    /// Training variant: forward plus backward in one call.  Parameter
    /// gradients are accumulated with the loss gradient scaled by
    /// `grad_scale`; returns the per-example errors and the (scaled)
    /// gradient with respect to `z`.
    fn reconstruct_error_train(
        &mut self,
        x: &Self::Input,
        z: &Matrix,
        grad_scale: f32,
    ) -> (Vec<f32>, Matrix);

    fn zero_grad(&mut self);
    fn parameters(&mut self) -> Vec<&mut LinearT>;
}
