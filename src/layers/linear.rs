use crate::math::Matrix;
use crate::rng::rng_from_env;
use rand::Rng;

// Bias-free linear module with manual gradient bookkeeping.  During training
// the layer stores the last input it saw so that a backward pass can compute
// gradients for both the input and the weight matrix.  Adam moments live on
// the layer so optimizer state persists across iterations and can be reset
// when the learning rate decays.

pub struct LinearT {
    pub w: Matrix,
    grad: Matrix,
    m: Matrix,
    v: Matrix,
    t: usize,
    last_x: Matrix,
}

impl LinearT {
    pub fn new(in_dim: usize, out_dim: usize) -> Self {
        let mut rng = rng_from_env();
        let w = Matrix::from_vec(
            in_dim,
            out_dim,
            (0..in_dim * out_dim)
                .map(|_| rng.gen_range(-0.01..0.01))
                .collect(),
        );
        let grad = Matrix::zeros(in_dim, out_dim);
        let m = Matrix::zeros(in_dim, out_dim);
        let v = Matrix::zeros(in_dim, out_dim);
        Self {
            w,
            grad,
            m,
            v,
            t: 0,
            last_x: Matrix::zeros(0, 0),
        }
    }

    /// Inference forward pass without caching.
    pub fn forward(&self, x: &Matrix) -> Matrix {
        Matrix::matmul(x, &self.w)
    }

    /// Training forward pass storing the input for [`LinearT::backward`].
    pub fn forward_train(&mut self, x: &Matrix) -> Matrix {
        self.last_x = x.clone();
        Matrix::matmul(x, &self.w)
    }

    /// Backward pass accumulating gradients against the cached input.
    pub fn backward(&mut self, grad_out: &Matrix) -> Matrix {
        let x = self.last_x.clone();
        self.backward_at(&x, grad_out)
    }

    /// Backward pass against an explicit input.
    ///
    /// Recurrent layers call the weight matrices once per time step, so the
    /// single-slot cache is not enough there; they keep their own per-step
    /// inputs and hand them back here.
    pub fn backward_at(&mut self, x: &Matrix, grad_out: &Matrix) -> Matrix {
        let grad_w = Matrix::matmul(&x.transpose(), grad_out);
        self.grad = self.grad.add(&grad_w);
        Matrix::matmul(grad_out, &self.w.transpose())
    }

    /// Borrow weight row `r` (embedding lookup support).
    pub fn weight_row(&self, r: usize) -> &[f32] {
        self.w.row(r)
    }

    /// Accumulate a gradient into weight row `r` (embedding backward).
    pub fn accum_grad_row(&mut self, r: usize, g: &[f32]) {
        let cols = self.grad.cols;
        for (c, &v) in g.iter().enumerate() {
            self.grad.data[r * cols + c] += v;
        }
    }

    pub fn zero_grad(&mut self) {
        self.grad = Matrix::zeros(self.grad.rows, self.grad.cols);
    }

    /// Squared L2 norm of the accumulated gradient, for global clipping.
    pub fn grad_norm_sq(&self) -> f32 {
        self.grad.data.iter().map(|g| g * g).sum()
    }

    /// Scale the accumulated gradient in place, for global clipping.
    pub fn scale_grad(&mut self, s: f32) {
        self.grad.scale(s);
    }

    pub fn sgd_step(&mut self, lr: f32) {
        for i in 0..self.grad.data.len() {
            self.w.data[i] -= lr * self.grad.data[i];
        }
    }

    pub fn adam_step(&mut self, lr: f32, beta1: f32, beta2: f32, eps: f32) {
        self.t += 1;
        for i in 0..self.grad.data.len() {
            let g = self.grad.data[i];
            self.m.data[i] = beta1 * self.m.data[i] + (1.0 - beta1) * g;
            self.v.data[i] = beta2 * self.v.data[i] + (1.0 - beta2) * g * g;
            let m_hat = self.m.data[i] / (1.0 - beta1.powi(self.t as i32));
            let v_hat = self.v.data[i] / (1.0 - beta2.powi(self.t as i32));
            self.w.data[i] -= lr * m_hat / (v_hat.sqrt() + eps);
        }
    }

    /// Drop the Adam moments, as if the optimizer had been rebuilt.
    pub fn reset_opt_state(&mut self) {
        self.m = Matrix::zeros(self.m.rows, self.m.cols);
        self.v = Matrix::zeros(self.v.rows, self.v.cols);
        self.t = 0;
    }

    pub fn parameters(&mut self) -> Vec<&mut LinearT> {
        vec![self]
    }
}
