use lagvae::data::BatchSource;
use lagvae::eval::{calc_au, calc_iwnll, calc_mi, evaluate};
use lagvae::layers::LinearT;
use lagvae::math::Matrix;
use lagvae::models::{Decoder, Encoder, Vae};
use rand::rngs::StdRng;

/// Encoder whose posterior mean is the input itself, with a fixed
/// log-variance.  Lets the metric reductions be checked by hand.
struct IdentityEncoder {
    lv: f32,
}

impl Encoder for IdentityEncoder {
    type Input = Matrix;

    fn forward(&self, x: &Matrix) -> (Matrix, Matrix) {
        let logvar = Matrix::from_vec(x.rows, x.cols, vec![self.lv; x.data.len()]);
        (x.clone(), logvar)
    }

    fn forward_train(&mut self, x: &Matrix) -> (Matrix, Matrix) {
        Encoder::forward(self, x)
    }

    fn backward(&mut self, _grad_mu: &Matrix, _grad_logvar: &Matrix) {}

    fn zero_grad(&mut self) {}

    fn parameters(&mut self) -> Vec<&mut LinearT> {
        Vec::new()
    }
}

/// Decoder assigning likelihood one to everything.
struct SilentDecoder {
    nz: usize,
}

impl Decoder for SilentDecoder {
    type Input = Matrix;

    fn reconstruct_error(&self, x: &Matrix, _z: &Matrix) -> Vec<f32> {
        vec![0.0; x.rows]
    }

    fn reconstruct_error_train(
        &mut self,
        x: &Matrix,
        _z: &Matrix,
        _grad_scale: f32,
    ) -> (Vec<f32>, Matrix) {
        (vec![0.0; x.rows], Matrix::zeros(x.rows, self.nz))
    }

    fn zero_grad(&mut self) {}

    fn parameters(&mut self) -> Vec<&mut LinearT> {
        Vec::new()
    }
}

struct FixedBatches {
    batches: Vec<Matrix>,
}

impl BatchSource for FixedBatches {
    type Batch = Matrix;

    fn num_examples(&self) -> usize {
        self.batches.iter().map(|b| b.rows).sum()
    }

    fn num_batches(&self) -> usize {
        self.batches.len()
    }

    fn epoch_batches(&self, _rng: &mut StdRng) -> Vec<Matrix> {
        self.batches.clone()
    }

    fn sample_batch(&self, _rng: &mut StdRng) -> Matrix {
        self.batches[0].clone()
    }

    fn batch_examples(batch: &Matrix) -> usize {
        batch.rows
    }
}

fn stub_vae(lv: f32, nz: usize) -> Vae<IdentityEncoder, SilentDecoder> {
    Vae::new(IdentityEncoder { lv }, SilentDecoder { nz }, nz)
}

#[test]
fn active_units_count_dimensions_whose_mean_varies() {
    let vae = stub_vae(0.0, 2);
    let data = FixedBatches {
        batches: vec![
            Matrix::from_vec(2, 2, vec![0.0, 5.0, 2.0, 5.0]),
            Matrix::from_vec(2, 2, vec![4.0, 5.0, 6.0, 5.0]),
        ],
    };
    let (au, var) = calc_au(&vae, &data, 0.01);
    assert_eq!(au, 1);
    // dim 0 means are 0,2,4,6: variance 20/3; dim 1 is constant
    assert!((var[0] - 20.0 / 3.0).abs() < 1e-4);
    assert!(var[1].abs() < 1e-6);
}

#[test]
fn evaluate_reduces_to_the_analytic_kl_for_a_silent_decoder() {
    let vae = stub_vae(0.0, 2);
    let data = FixedBatches {
        batches: vec![Matrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 2.0])],
    };
    // rec = 0 and logvar = 0, so the loss is pure KL: 0.5 * sum(mu^2)
    let (loss, nll, kl) = evaluate(&vae, &data, "TEST", 1);
    let expect = (0.5 + 2.0) / 2.0;
    assert!((loss - expect).abs() < 1e-5);
    assert!((nll - expect).abs() < 1e-5);
    assert!((kl - expect).abs() < 1e-5);
}

#[test]
fn mutual_information_is_a_finite_weighted_average() {
    let vae = stub_vae(-2.0, 2);
    let data = FixedBatches {
        batches: vec![
            Matrix::from_vec(2, 2, vec![0.0, 0.0, 3.0, 3.0]),
            Matrix::from_vec(2, 2, vec![-3.0, 1.0, 2.0, -2.0]),
        ],
    };
    let mi = calc_mi(&vae, &data);
    assert!(mi.is_finite());
}

#[test]
fn iw_nll_is_zero_when_the_posterior_equals_the_prior() {
    // mu = 0 and logvar = 0 make q identical to the prior; with a silent
    // decoder every importance weight is exactly one
    let vae = stub_vae(0.0, 3);
    let data = FixedBatches {
        batches: vec![Matrix::zeros(4, 3)],
    };
    let nll = calc_iwnll(&vae, &data, 20);
    assert!(nll.abs() < 1e-4);
}
