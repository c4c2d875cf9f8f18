use crate::math::Matrix;
use crate::rng::rng_from_env;
use rand::Rng;

/// Dropout layer that randomly zeros elements during training.
///
/// Kept elements are scaled by `1/(1 - p)` ("inverted" dropout) so the
/// expected activation is unchanged.  The generated mask is stored for the
/// backward pass.
pub struct Dropout {
    mask: Vec<f32>,
    rng: rand::rngs::StdRng,
}

impl Dropout {
    pub fn new() -> Self {
        Self {
            mask: Vec::new(),
            rng: rng_from_env(),
        }
    }

    /// Forward pass.  When `train` is false the input is returned unchanged.
    pub fn forward(&mut self, x: &Matrix, p: f32, train: bool) -> Matrix {
        if !train || p == 0.0 {
            self.mask = vec![1.0; x.data.len()];
            return x.clone();
        }
        let mut out = Matrix::zeros(x.rows, x.cols);
        self.mask = vec![0.0; x.data.len()];
        let scale = if p < 1.0 { 1.0 / (1.0 - p) } else { 0.0 };
        for i in 0..x.data.len() {
            if self.rng.gen::<f32>() >= p {
                self.mask[i] = scale;
                out.data[i] = x.data[i] * scale;
            }
        }
        out
    }

    /// Backward pass using the mask generated in `forward`.
    pub fn backward(&self, grad: &Matrix) -> Matrix {
        let mut grad_input = Matrix::zeros(grad.rows, grad.cols);
        for i in 0..grad.data.len() {
            grad_input.data[i] = grad.data[i] * self.mask[i];
        }
        grad_input
    }
}

impl Default for Dropout {
    fn default() -> Self {
        Self::new()
    }
}
