use crate::data::BatchSource;
use crate::info;
use crate::models::{Decoder, Encoder, Vae};
use crate::rng::rng_from_env;

/// Posterior-mean variance threshold for a latent unit to count as active.
pub const AU_DELTA: f32 = 0.01;

/// Average negative ELBO over a split, decomposed into reconstruction and KL.
/// Returns `(loss, nll, kl)` per example.
pub fn evaluate<E, D, S>(vae: &Vae<E, D>, data: &S, label: &str, nsamples: usize) -> (f32, f32, f32)
where
    E: Encoder,
    D: Decoder<Input = E::Input>,
    S: BatchSource<Batch = E::Input>,
{
    let mut rng = rng_from_env();
    let mut rec_sum = 0.0f32;
    let mut kl_sum = 0.0f32;
    let mut examples = 0usize;
    for batch in data.epoch_batches(&mut rng) {
        let stats = vae.loss_eval(&batch, nsamples);
        rec_sum += stats.rec_sum;
        kl_sum += stats.kl_sum;
        examples += stats.examples;
    }
    let mi = calc_mi(vae, data);
    let n = examples as f32;
    let loss = (rec_sum + kl_sum) / n;
    let kl = kl_sum / n;
    info!(
        "{label} --- avg_loss: {loss:.4}, kl: {kl:.4}, mi: {mi:.4}, recon: {:.4}, nll: {loss:.4}",
        rec_sum / n
    );
    (loss, loss, kl)
}

/// Mutual information between inputs and latent codes, accumulated as an
/// example-count-weighted average over batches.
pub fn calc_mi<E, D, S>(vae: &Vae<E, D>, data: &S) -> f32
where
    E: Encoder,
    D: Decoder<Input = E::Input>,
    S: BatchSource<Batch = E::Input>,
{
    let mut rng = rng_from_env();
    let mut mi = 0.0f32;
    let mut examples = 0usize;
    for batch in data.epoch_batches(&mut rng) {
        let n = S::batch_examples(&batch);
        mi += vae.calc_mi_q(&batch) * n as f32;
        examples += n;
    }
    mi / examples.max(1) as f32
}

/// Number of active latent units: dimensions whose posterior-mean variance
/// across the split exceeds `delta`.  Also returns the per-dimension
/// variances.
pub fn calc_au<E, D, S>(vae: &Vae<E, D>, data: &S, delta: f32) -> (usize, Vec<f32>)
where
    E: Encoder,
    D: Decoder<Input = E::Input>,
    S: BatchSource<Batch = E::Input>,
{
    let mut rng = rng_from_env();
    let mut means: Vec<Vec<f32>> = Vec::new();
    for batch in data.epoch_batches(&mut rng) {
        let (mu, _) = vae.encode_stats(&batch);
        for r in 0..mu.rows {
            means.push(mu.row(r).to_vec());
        }
    }
    let n = means.len();
    let nz = means.first().map(|m| m.len()).unwrap_or(0);
    let mut mean = vec![0.0f32; nz];
    for m in &means {
        for (c, &v) in m.iter().enumerate() {
            mean[c] += v;
        }
    }
    for v in mean.iter_mut() {
        *v /= n as f32;
    }
    let mut var = vec![0.0f32; nz];
    for m in &means {
        for (c, &v) in m.iter().enumerate() {
            let dev = v - mean[c];
            var[c] += dev * dev;
        }
    }
    for v in var.iter_mut() {
        *v /= (n - 1) as f32;
    }
    let au = var.iter().filter(|&&v| v >= delta).count();
    (au, var)
}

/// Importance-weighted NLL over a split, with progress reported at decile
/// boundaries.
pub fn calc_iwnll<E, D, S>(vae: &Vae<E, D>, data: &S, iw_nsamples: usize) -> f32
where
    E: Encoder,
    D: Decoder<Input = E::Input>,
    S: BatchSource<Batch = E::Input>,
{
    let mut rng = rng_from_env();
    let batches = data.epoch_batches(&mut rng);
    let decile = (batches.len() / 10).max(1);
    let mut nll_sum = 0.0f32;
    let mut examples = 0usize;
    for (i, batch) in batches.iter().enumerate() {
        if i % decile == 0 {
            info!("iw nll computing {}0%", i / decile);
        }
        let nlls = vae.nll_iw(batch, iw_nsamples);
        nll_sum += nlls.iter().sum::<f32>();
        examples += S::batch_examples(batch);
    }
    let nll = nll_sum / examples.max(1) as f32;
    info!("iw nll: {nll:.4}");
    nll
}
