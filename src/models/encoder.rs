use crate::layers::LinearT;
use crate::math::Matrix;
use crate::rng::rng_from_env;
use rand_distr::{Distribution, StandardNormal};
use std::f32::consts::PI;

/// Inference network mapping an input batch to the parameters of a diagonal
/// Gaussian approximate posterior.
///
/// `forward` is the inference path and touches no caches; `forward_train`
/// stores whatever the matching `backward` needs.  `backward` receives the
/// loss gradients with respect to the posterior mean and log-variance and
/// accumulates parameter gradients.
pub trait Encoder {
    type Input;

    fn forward(&self, x: &Self::Input) -> (Matrix, Matrix);
    fn forward_train(&mut self, x: &Self::Input) -> (Matrix, Matrix);
    fn backward(&mut self, grad_mu: &Matrix, grad_logvar: &Matrix);
    fn zero_grad(&mut self);
    fn parameters(&mut self) -> Vec<&mut LinearT>;
}

/// Draw `nsamples` reparameterized samples `z = mu + eps * exp(logvar / 2)`.
///
/// Returns `(z, eps)` pairs; the noise is kept so the training path can send
/// gradient back through the sampling step.
pub fn reparameterize(mu: &Matrix, logvar: &Matrix, nsamples: usize) -> Vec<(Matrix, Matrix)> {
    let mut rng = rng_from_env();
    let mut out = Vec::with_capacity(nsamples);
    for _ in 0..nsamples {
        let mut z = Matrix::zeros(mu.rows, mu.cols);
        let mut eps = Matrix::zeros(mu.rows, mu.cols);
        for i in 0..mu.data.len() {
            let std = (0.5 * logvar.data[i]).exp();
            let e: f32 = StandardNormal.sample(&mut rng);
            eps.data[i] = e;
            z.data[i] = mu.data[i] + e * std;
        }
        out.push((z, eps));
    }
    out
}

/// Analytic KL(q(z|x) || N(0, I)) per example.
pub fn gaussian_kl(mu: &Matrix, logvar: &Matrix) -> Vec<f32> {
    let mut kl = vec![0.0f32; mu.rows];
    for r in 0..mu.rows {
        let mut sum = 0.0f32;
        for c in 0..mu.cols {
            let m = mu.get(r, c);
            let lv = logvar.get(r, c);
            sum += m * m + lv.exp() - lv - 1.0;
        }
        kl[r] = 0.5 * sum;
    }
    kl
}

/// log q(z_r | x_r) for row-aligned samples and posterior parameters.
pub fn log_density(z: &Matrix, mu: &Matrix, logvar: &Matrix) -> Vec<f32> {
    let nz = mu.cols as f32;
    let mut out = vec![0.0f32; z.rows];
    for r in 0..z.rows {
        let mut quad = 0.0f32;
        let mut lv_sum = 0.0f32;
        for c in 0..mu.cols {
            let lv = logvar.get(r, c);
            let dev = z.get(r, c) - mu.get(r, c);
            quad += dev * dev / lv.exp();
            lv_sum += lv;
        }
        out[r] = -0.5 * quad - 0.5 * (nz * (2.0 * PI).ln() + lv_sum);
    }
    out
}

/// log q(z_i | x_j) for every pair of latent sample and posterior, as an
/// `(z.rows, mu.rows)` matrix.  Used by the aggregate-posterior term of the
/// mutual-information estimate.
pub fn pairwise_log_density(z: &Matrix, mu: &Matrix, logvar: &Matrix) -> Matrix {
    let nz = mu.cols as f32;
    let mut out = Matrix::zeros(z.rows, mu.rows);
    for i in 0..z.rows {
        for j in 0..mu.rows {
            let mut quad = 0.0f32;
            let mut lv_sum = 0.0f32;
            for c in 0..mu.cols {
                let lv = logvar.get(j, c);
                let dev = z.get(i, c) - mu.get(j, c);
                quad += dev * dev / lv.exp();
                lv_sum += lv;
            }
            out.set(i, j, -0.5 * quad - 0.5 * (nz * (2.0 * PI).ln() + lv_sum));
        }
    }
    out
}

/// log p(z) under the standard normal prior, per row.
pub fn log_prior(z: &Matrix) -> Vec<f32> {
    let nz = z.cols as f32;
    let mut out = vec![0.0f32; z.rows];
    for r in 0..z.rows {
        let quad: f32 = z.row(r).iter().map(|v| v * v).sum();
        out[r] = -0.5 * quad - 0.5 * nz * (2.0 * PI).ln();
    }
    out
}
