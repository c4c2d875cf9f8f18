use crate::config::{Domain, Settings};
use crate::data::BatchSource;
use crate::eval::{self, AU_DELTA};
use crate::info;
use crate::logging::{Logger, MetricRecord};
use crate::models::{Decoder, Encoder, Vae};
use crate::optim::{clip_grad_norm, Adam, DecayDecision, Optimizer, PlateauDecay, Sgd};
use crate::rng::rng_from_env;
use crate::weights;
use indicatif::ProgressBar;
use std::io;
use std::time::Instant;

/// Global gradient-norm bound applied before every optimizer step.
pub const CLIP_GRAD: f32 = 5.0;
/// Multiplier applied to the learning rate on each plateau decay.
pub const LR_DECAY: f32 = 0.5;
/// Training stops after this many decays.
pub const MAX_DECAY: usize = 5;
/// Hard cap on encoder-only updates per outer batch.
pub const MAX_AGGRESSIVE_STEPS: usize = 100;
/// Aggressive mode is disabled for good after this many consecutive
/// validation-MI checks without improvement.
pub const MI_PATIENCE: usize = 5;

/// Linear KL-weight annealing: from `kl_start` up to 1.0 over the warm-up
/// batches, then held there.  The weight never decreases.
pub struct KlAnneal {
    weight: f32,
    rate: f32,
}

impl KlAnneal {
    pub fn new(kl_start: f32, warm_up: usize, batches_per_epoch: usize) -> Self {
        let total = (warm_up * batches_per_epoch).max(1);
        Self {
            weight: kl_start.min(1.0),
            rate: ((1.0 - kl_start) / total as f32).max(0.0),
        }
    }

    /// Advance one batch and return the current weight.
    pub fn step(&mut self) -> f32 {
        self.weight = (self.weight + self.rate).min(1.0);
        self.weight
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }
}

/// Stop rule for the aggressive inner loop: every 10 steps the block-average
/// loss is compared to the previous block's; the loop ends when it stops
/// decreasing, or at [`MAX_AGGRESSIVE_STEPS`].
pub struct BurnState {
    sub_iter: usize,
    pre_loss: f32,
    cur_loss: f32,
    num_examples: usize,
}

impl BurnState {
    pub fn new() -> Self {
        Self {
            sub_iter: 1,
            pre_loss: f32::INFINITY,
            cur_loss: 0.0,
            num_examples: 0,
        }
    }

    /// Record one inner step; returns false when the loop should stop.
    pub fn observe(&mut self, loss_sum: f32, examples: usize) -> bool {
        self.cur_loss += loss_sum;
        self.num_examples += examples;
        if self.sub_iter % 10 == 0 {
            let avg = self.cur_loss / self.num_examples.max(1) as f32;
            if self.pre_loss - avg < 0.0 {
                return false;
            }
            self.pre_loss = avg;
            self.cur_loss = 0.0;
            self.num_examples = 0;
        }
        self.sub_iter += 1;
        self.sub_iter < MAX_AGGRESSIVE_STEPS
    }
}

impl Default for BurnState {
    fn default() -> Self {
        Self::new()
    }
}

/// Curriculum switch for aggressive mode: once validation MI fails to
/// improve [`MI_PATIENCE`] checks in a row, aggressive updates are disabled
/// permanently.
pub struct AggressiveControl {
    enabled: bool,
    best_mi: f32,
    not_improved: usize,
}

impl AggressiveControl {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            best_mi: 0.0,
            not_improved: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Record a validation MI measurement; returns whether aggressive mode
    /// is still enabled.
    pub fn observe(&mut self, mi: f32) -> bool {
        if !self.enabled {
            return false;
        }
        if mi - self.best_mi < 0.0 {
            self.not_improved += 1;
            if self.not_improved == MI_PATIENCE {
                self.enabled = false;
            }
        } else {
            self.best_mi = mi;
            self.not_improved = 0;
        }
        self.enabled
    }
}

/// Final metrics from a training run.
pub struct TrainResult {
    pub best_val_loss: f32,
    pub test_loss: f32,
    pub test_nll: f32,
    pub test_kl: f32,
}

/// Drive the full optimization schedule over `train_data`.
///
/// Per batch: an optional aggressive inner loop of encoder-only updates on
/// freshly resampled batches, then one joint step (decoder always, encoder
/// only while aggressive mode is off).  Validation loss controls
/// checkpointing and plateau decay; validation MI controls the aggressive
/// switch.  Ends by reloading the best checkpoint and reporting test
/// metrics.
pub fn run<E, D, S>(
    vae: &mut Vae<E, D>,
    train_data: &S,
    val_data: &S,
    test_data: &S,
    st: &Settings,
) -> io::Result<TrainResult>
where
    E: Encoder,
    D: Decoder<Input = E::Input>,
    S: BatchSource<Batch = E::Input>,
    E::Input: Clone,
{
    let p = &st.params;
    let (mut enc_opt, mut dec_opt): (Box<dyn Optimizer>, Box<dyn Optimizer>) = match p.domain {
        Domain::Image => (Box::new(Adam::new(p.lr)), Box::new(Adam::new(p.lr))),
        Domain::Text => (Box::new(Sgd::new(p.lr)), Box::new(Sgd::new(p.lr))),
    };
    let n_train_batches = train_data.num_batches();
    let mut anneal = KlAnneal::new(st.kl_start, st.warm_up, n_train_batches);
    let mut aggressive = AggressiveControl::new(st.aggressive);
    let mut plateau = PlateauDecay::new(p.lr, LR_DECAY, p.decay_epoch, MAX_DECAY);
    let mut best_loss = f32::INFINITY;
    let mut logger = Logger::new(&st.run_id()).ok();
    let log_niter = (n_train_batches / 5).max(1);
    let mut rng = rng_from_env();
    let pb = ProgressBar::new(p.epochs as u64);
    let mut iter = 0usize;
    let start = Instant::now();

    info!("Train data: {} batches", n_train_batches);
    info!("Val data: {} batches", val_data.num_batches());
    info!("Test data: {} batches", test_data.num_batches());

    for epoch in 0..p.epochs {
        let mut report_rec = 0.0f32;
        let mut report_kl = 0.0f32;
        let mut report_examples = 0usize;

        for batch in train_data.epoch_batches(&mut rng) {
            let kl_weight = anneal.step();

            if aggressive.enabled() {
                let mut burn = BurnState::new();
                let mut enc_batch = batch.clone();
                loop {
                    vae.zero_grad();
                    let stats = vae.loss_train(&enc_batch, kl_weight, st.nsamples);
                    clip_grad_norm(&mut vae.parameters(), CLIP_GRAD);
                    enc_opt.step(&mut vae.encoder_parameters());
                    enc_batch = train_data.sample_batch(&mut rng);
                    if !burn.observe(stats.total_sum, stats.examples) {
                        break;
                    }
                }
            }

            vae.zero_grad();
            let stats = vae.loss_train(&batch, kl_weight, st.nsamples);
            clip_grad_norm(&mut vae.parameters(), CLIP_GRAD);
            if !aggressive.enabled() {
                enc_opt.step(&mut vae.encoder_parameters());
            }
            dec_opt.step(&mut vae.decoder_parameters());

            report_rec += stats.rec_sum;
            report_kl += stats.kl_sum;
            report_examples += stats.examples;

            if iter % log_niter == 0 {
                let n = report_examples.max(1) as f32;
                let train_loss = (report_rec + report_kl) / n;
                let (mi, au) = if aggressive.enabled() || epoch == 0 {
                    let mi = eval::calc_mi(vae, val_data);
                    let (au, _) = eval::calc_au(vae, val_data, AU_DELTA);
                    info!(
                        "epoch: {epoch}, iter: {iter}, avg_loss: {train_loss:.4}, kl: {:.4}, \
                         mi: {mi:.4}, recon: {:.4}, au {au}, time elapsed {:.2}s",
                        report_kl / n,
                        report_rec / n,
                        start.elapsed().as_secs_f32()
                    );
                    (Some(mi), Some(au))
                } else {
                    info!(
                        "epoch: {epoch}, iter: {iter}, avg_loss: {train_loss:.4}, kl: {:.4}, \
                         recon: {:.4}, time elapsed {:.2}s",
                        report_kl / n,
                        report_rec / n,
                        start.elapsed().as_secs_f32()
                    );
                    (None, None)
                };
                if let Some(l) = logger.as_mut() {
                    l.log(&MetricRecord {
                        epoch,
                        iter,
                        loss: train_loss,
                        kl: report_kl / n,
                        recon: report_rec / n,
                        mi,
                        au,
                        lr: plateau.lr(),
                        kind: "batch",
                    });
                }
                report_rec = 0.0;
                report_kl = 0.0;
                report_examples = 0;
            }
            iter += 1;

            // once per pass over the training data, let validation MI decide
            // whether burning is still worth it
            if aggressive.enabled() && iter % n_train_batches == 0 {
                let mi = eval::calc_mi(vae, val_data);
                if !aggressive.observe(mi) {
                    info!("STOP BURNING");
                }
            }
        }

        info!("kl weight {:.4}", anneal.weight());
        info!("epoch: {epoch}, VAL");
        let (val_loss, _, _) = eval::evaluate(vae, val_data, "VAL", st.nsamples);
        let (au, _) = eval::calc_au(vae, val_data, AU_DELTA);
        info!("{au} active units");

        if val_loss < best_loss {
            info!("update best loss");
            best_loss = val_loss;
            weights::save_vae(&st.save_path, vae)?;
        }
        if let DecayDecision::Decay { new_lr } = plateau.observe(val_loss, best_loss) {
            weights::load_vae(&st.save_path, vae)?;
            for param in vae.parameters() {
                param.reset_opt_state();
            }
            enc_opt.set_lr(new_lr);
            dec_opt.set_lr(new_lr);
            info!("new lr: {new_lr}");
        }
        if let Some(l) = logger.as_mut() {
            l.log(&MetricRecord {
                epoch,
                iter,
                loss: val_loss,
                kl: 0.0,
                recon: 0.0,
                mi: None,
                au: Some(au),
                lr: plateau.lr(),
                kind: "epoch",
            });
        }
        if plateau.exhausted() {
            break;
        }
        if epoch % p.test_nepoch == 0 {
            eval::evaluate(vae, test_data, "TEST", st.nsamples);
        }
        pb.inc(1);
    }
    pb.finish_with_message("training done");

    // final report from the best checkpoint
    weights::load_vae(&st.save_path, vae)?;
    let (test_loss, test_nll, test_kl) = eval::evaluate(vae, test_data, "TEST", st.nsamples);
    let (au, _) = eval::calc_au(vae, test_data, AU_DELTA);
    info!("{au} active units");

    Ok(TrainResult {
        best_val_loss: best_loss,
        test_loss,
        test_nll,
        test_kl,
    })
}
