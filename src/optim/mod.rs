pub mod adam;
pub mod lr_scheduler;
pub mod sgd;

pub use adam::Adam;
pub use lr_scheduler::{DecayDecision, PlateauDecay};
pub use sgd::Sgd;

use crate::layers::LinearT;

/// Common interface for optimizers operating on linear layers.
pub trait Optimizer {
    /// Update the provided parameters in-place.
    fn step(&mut self, params: &mut [&mut LinearT]);

    /// Change the learning rate (plateau decay).
    fn set_lr(&mut self, lr: f32);
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut LinearT]) {
        Adam::step(self, params);
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut LinearT]) {
        Sgd::step(self, params);
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// Scale gradients so their global L2 norm does not exceed `max_norm`.
/// Returns the norm before clipping.
pub fn clip_grad_norm(params: &mut [&mut LinearT], max_norm: f32) -> f32 {
    let mut total = 0.0f32;
    for p in params.iter() {
        total += p.grad_norm_sq();
    }
    let norm = total.sqrt();
    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for p in params.iter_mut() {
            p.scale_grad(scale);
        }
    }
    norm
}
