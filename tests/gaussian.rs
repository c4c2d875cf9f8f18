use lagvae::math::{log_sum_exp, Matrix};
use lagvae::models::encoder::{
    gaussian_kl, log_density, log_prior, pairwise_log_density, reparameterize,
};
use std::f32::consts::PI;

#[test]
fn kl_of_the_prior_is_zero() {
    let mu = Matrix::zeros(3, 4);
    let logvar = Matrix::zeros(3, 4);
    for kl in gaussian_kl(&mu, &logvar) {
        assert!(kl.abs() < 1e-6);
    }
}

#[test]
fn kl_matches_the_manual_formula() {
    let mu = Matrix::from_vec(1, 2, vec![0.5, -1.0]);
    let logvar = Matrix::from_vec(1, 2, vec![0.2, -0.3]);
    let manual: f32 = [(0.5f32, 0.2f32), (-1.0, -0.3)]
        .iter()
        .map(|(m, lv)| 0.5 * (m * m + lv.exp() - lv - 1.0))
        .sum();
    let kl = gaussian_kl(&mu, &logvar);
    assert!((kl[0] - manual).abs() < 1e-6);
}

#[test]
fn log_density_matches_the_normal_logpdf() {
    let mu = Matrix::from_vec(1, 1, vec![0.5]);
    let logvar = Matrix::from_vec(1, 1, vec![0.25f32.ln()]);
    let z = Matrix::from_vec(1, 1, vec![1.0]);
    let var = 0.25f32;
    let manual = -0.5 * (1.0f32 - 0.5).powi(2) / var - 0.5 * ((2.0 * PI).ln() + var.ln());
    let got = log_density(&z, &mu, &logvar);
    assert!((got[0] - manual).abs() < 1e-5);
}

#[test]
fn pairwise_diagonal_agrees_with_rowwise_density() {
    let mu = Matrix::from_vec(3, 2, vec![0.0, 1.0, -0.5, 0.3, 2.0, -1.0]);
    let logvar = Matrix::from_vec(3, 2, vec![0.1, -0.2, 0.0, 0.4, -0.1, 0.2]);
    let z = Matrix::from_vec(3, 2, vec![0.2, 0.9, -0.4, 0.5, 1.8, -1.2]);
    let rowwise = log_density(&z, &mu, &logvar);
    let pairwise = pairwise_log_density(&z, &mu, &logvar);
    for i in 0..3 {
        assert!((pairwise.get(i, i) - rowwise[i]).abs() < 1e-5);
    }
}

#[test]
fn prior_is_a_standard_normal_density() {
    let z = Matrix::from_vec(2, 3, vec![0.1, -0.2, 0.3, 1.0, 0.0, -1.0]);
    let mu = Matrix::zeros(2, 3);
    let logvar = Matrix::zeros(2, 3);
    let via_density = log_density(&z, &mu, &logvar);
    let via_prior = log_prior(&z);
    for (a, b) in via_prior.iter().zip(via_density.iter()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn reparameterized_samples_collapse_onto_the_mean_for_tiny_variance() {
    let mu = Matrix::from_vec(2, 3, vec![1.0, -2.0, 0.5, 3.0, 0.0, -0.7]);
    let logvar = Matrix::from_vec(2, 3, vec![-30.0; 6]);
    for (z, eps) in reparameterize(&mu, &logvar, 4) {
        assert_eq!(z.rows, 2);
        assert_eq!(z.cols, 3);
        assert_eq!(eps.rows, 2);
        for (zv, mv) in z.data.iter().zip(mu.data.iter()) {
            assert!((zv - mv).abs() < 1e-4);
        }
    }
}

#[test]
fn log_sum_exp_of_identical_terms() {
    let xs = [-3.0f32; 8];
    assert!((log_sum_exp(&xs) - (-3.0 + 8.0f32.ln())).abs() < 1e-5);
}
