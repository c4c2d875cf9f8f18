use super::decoder::Decoder;
use super::encoder::{
    gaussian_kl, log_density, log_prior, pairwise_log_density, reparameterize, Encoder,
};
use crate::layers::LinearT;
use crate::math::{log_sum_exp, Matrix};
use crate::rng::rng_from_env;
use rand_distr::{Distribution, StandardNormal};
use std::f32::consts::PI;

/// Importance samples are drawn in chunks of this size to bound the memory
/// of the per-chunk decoder pass.
const IW_CHUNK: usize = 50;

/// Loss summary for one batch.
pub struct LossStats {
    /// Per-example reconstruction + weighted KL.
    pub total_sum: f32,
    /// Summed reconstruction error, averaged over posterior samples.
    pub rec_sum: f32,
    /// Summed (unweighted) KL term.
    pub kl_sum: f32,
    pub examples: usize,
}

/// VAE composite owning the inference and generative networks.
pub struct Vae<E, D> {
    pub encoder: E,
    pub decoder: D,
    nz: usize,
}

impl<E, D> Vae<E, D>
where
    E: Encoder,
    D: Decoder<Input = E::Input>,
{
    pub fn new(encoder: E, decoder: D, nz: usize) -> Self {
        Self {
            encoder,
            decoder,
            nz,
        }
    }

    pub fn nz(&self) -> usize {
        self.nz
    }

    /// Training loss: forward and backward in one pass.
    ///
    /// Accumulates gradients for every parameter as if
    /// `mean_over_batch(rec / nsamples + kl_weight * kl)` had been
    /// differentiated; callers clip and step afterwards.
    pub fn loss_train(&mut self, x: &E::Input, kl_weight: f32, nsamples: usize) -> LossStats {
        let (mu, logvar) = self.encoder.forward_train(x);
        let batch = mu.rows;
        let kl = gaussian_kl(&mu, &logvar);
        let grad_scale = 1.0 / (batch * nsamples) as f32;

        let mut grad_mu = Matrix::zeros(batch, self.nz);
        let mut grad_logvar = Matrix::zeros(batch, self.nz);
        let mut rec = vec![0.0f32; batch];
        for (z, eps) in reparameterize(&mu, &logvar, nsamples) {
            let (losses, grad_z) = self.decoder.reconstruct_error_train(x, &z, grad_scale);
            for b in 0..batch {
                rec[b] += losses[b] / nsamples as f32;
            }
            // z = mu + eps * std: the sample gradient reaches mu directly
            // and logvar through d std / d logvar = 0.5 * std
            for i in 0..grad_mu.data.len() {
                let std = (0.5 * logvar.data[i]).exp();
                grad_mu.data[i] += grad_z.data[i];
                grad_logvar.data[i] += grad_z.data[i] * eps.data[i] * 0.5 * std;
            }
        }
        // analytic KL gradients, mean over the batch
        let kl_scale = kl_weight / batch as f32;
        for i in 0..grad_mu.data.len() {
            grad_mu.data[i] += kl_scale * mu.data[i];
            grad_logvar.data[i] += kl_scale * 0.5 * (logvar.data[i].exp() - 1.0);
        }
        self.encoder.backward(&grad_mu, &grad_logvar);

        let rec_sum: f32 = rec.iter().sum();
        let kl_sum: f32 = kl.iter().sum();
        let total_sum = rec
            .iter()
            .zip(kl.iter())
            .map(|(r, k)| r + kl_weight * k)
            .sum();
        LossStats {
            total_sum,
            rec_sum,
            kl_sum,
            examples: batch,
        }
    }

    /// Evaluation loss: summed reconstruction and KL terms, no gradients.
    pub fn loss_eval(&self, x: &E::Input, nsamples: usize) -> LossStats {
        let (mu, logvar) = self.encoder.forward(x);
        let batch = mu.rows;
        let kl = gaussian_kl(&mu, &logvar);
        let mut rec = vec![0.0f32; batch];
        for (z, _) in reparameterize(&mu, &logvar, nsamples) {
            let losses = self.decoder.reconstruct_error(x, &z);
            for b in 0..batch {
                rec[b] += losses[b] / nsamples as f32;
            }
        }
        let rec_sum: f32 = rec.iter().sum();
        let kl_sum: f32 = kl.iter().sum();
        LossStats {
            total_sum: rec_sum + kl_sum,
            rec_sum,
            kl_sum,
            examples: batch,
        }
    }

    /// Posterior parameters without sampling.
    pub fn encode_stats(&self, x: &E::Input) -> (Matrix, Matrix) {
        self.encoder.forward(x)
    }

    /// Mutual information between inputs and latent codes under q, estimated
    /// on one batch: E_q [log q(z|x)] - E_q [log q(z)], with the aggregate
    /// posterior approximated over the batch.
    pub fn calc_mi_q(&self, x: &E::Input) -> f32 {
        let (mu, logvar) = self.encoder.forward(x);
        let batch = mu.rows;
        let nz = self.nz as f32;

        // E_{q(z|x)} [log q(z|x)] has a closed form: the negative entropy
        let mut neg_entropy = 0.0f32;
        for r in 0..batch {
            let lv_sum: f32 = logvar.row(r).iter().sum();
            neg_entropy += -0.5 * nz * (2.0 * PI).ln() - 0.5 * (nz + lv_sum);
        }
        neg_entropy /= batch as f32;

        let (z, _) = reparameterize(&mu, &logvar, 1).pop().expect("one sample");
        let dens = pairwise_log_density(&z, &mu, &logvar);
        let mut log_qz_sum = 0.0f32;
        for i in 0..batch {
            log_qz_sum += log_sum_exp(dens.row(i)) - (batch as f32).ln();
        }
        neg_entropy - log_qz_sum / batch as f32
    }

    /// Importance-weighted estimate of -log p(x) per example using
    /// `nsamples` proposals from q(z|x).
    pub fn nll_iw(&self, x: &E::Input, nsamples: usize) -> Vec<f32> {
        let (mu, logvar) = self.encoder.forward(x);
        let batch = mu.rows;
        let mut log_ws: Vec<Vec<f32>> = vec![Vec::with_capacity(nsamples); batch];
        let mut remaining = nsamples;
        while remaining > 0 {
            let chunk = remaining.min(IW_CHUNK);
            for (z, _) in reparameterize(&mu, &logvar, chunk) {
                let rec = self.decoder.reconstruct_error(x, &z);
                let prior = log_prior(&z);
                let posterior = log_density(&z, &mu, &logvar);
                for b in 0..batch {
                    log_ws[b].push(prior[b] - rec[b] - posterior[b]);
                }
            }
            remaining -= chunk;
        }
        log_ws
            .iter()
            .map(|ws| -(log_sum_exp(ws) - (nsamples as f32).ln()))
            .collect()
    }

    /// Draw latent codes from the standard normal prior.
    pub fn sample_from_prior(&self, n: usize) -> Matrix {
        let mut rng = rng_from_env();
        let mut z = Matrix::zeros(n, self.nz);
        for v in z.data.iter_mut() {
            *v = StandardNormal.sample(&mut rng);
        }
        z
    }

    pub fn zero_grad(&mut self) {
        self.encoder.zero_grad();
        self.decoder.zero_grad();
    }

    pub fn encoder_parameters(&mut self) -> Vec<&mut LinearT> {
        self.encoder.parameters()
    }

    pub fn decoder_parameters(&mut self) -> Vec<&mut LinearT> {
        self.decoder.parameters()
    }

    pub fn parameters(&mut self) -> Vec<&mut LinearT> {
        let mut params = self.encoder.parameters();
        params.extend(self.decoder.parameters());
        params
    }
}
