use lagvae::config::{Domain, Settings};
use lagvae::data::{save_image_grid, ImageData};
use lagvae::eval;
use lagvae::models::{ImageVae, PixelCnnDecoder, ResNetEncoder, Vae};
use lagvae::rng::rng_from_env;
use lagvae::train;
use lagvae::weights;
use lagvae::{error, info};
use std::io;
use std::path::Path;
use std::process;

mod common;

fn main() {
    let Some(st) = common::settings_from_env() else {
        process::exit(2);
    };
    if st.params.domain != Domain::Image {
        error!("dataset `{}` is not an image dataset", st.dataset);
        process::exit(2);
    }
    info!("{st:?}");

    let p = &st.params;
    let data = match ImageData::load(&st.dataset, &p.data_dir, p.batch_size) {
        Ok(d) => d,
        Err(e) => {
            error!("failed to load dataset `{}`: {e}", st.dataset);
            process::exit(1);
        }
    };
    let mut vae: ImageVae = Vae::new(
        ResNetEncoder::new(p.img_size, p.channels, p.enc_hidden, p.enc_blocks, p.nz),
        PixelCnnDecoder::new(p.img_size, p.pixel_channels, p.pixel_layers, p.nz),
        p.nz,
    );

    if !st.sample_from.is_empty() {
        if let Err(e) = sample(&mut vae, &st) {
            error!("sampling failed: {e}");
            process::exit(1);
        }
        return;
    }

    if st.eval {
        if st.load_path.is_empty() {
            error!("--eval needs --load-path");
            process::exit(2);
        }
        if let Err(e) = weights::load_vae(&st.load_path, &mut vae) {
            error!("failed to load checkpoint `{}`: {e}", st.load_path);
            process::exit(1);
        }
        info!("begin evaluation");
        let test = data.test.with_batch_size(50);
        eval::evaluate(&vae, &test, "TEST", st.nsamples);
        let (au, _) = eval::calc_au(&vae, &test, eval::AU_DELTA);
        info!("{au} active units");
        eval::calc_iwnll(&vae, &test, st.iw_nsamples);
        return;
    }

    match train::run(&mut vae, &data.train, &data.val, &data.test, &st) {
        Ok(_) => {
            let iw_test = data.test.with_batch_size(50);
            eval::calc_iwnll(&vae, &iw_test, st.iw_nsamples);
        }
        Err(e) => {
            error!("training failed: {e}");
            process::exit(1);
        }
    }
}

/// Load a checkpoint, draw 400 prior samples and write binary + continuous
/// 20-per-row grids under the per-dataset samples directory.
fn sample(vae: &mut ImageVae, st: &Settings) -> io::Result<()> {
    weights::load_vae(&st.sample_from, vae)?;
    let dir = st.samples_dir();
    std::fs::create_dir_all(&dir)?;

    let z = vae.sample_from_prior(400);
    let mut rng = rng_from_env();
    let (samples, probs) = vae.decoder.sample(&z, &mut rng);

    let stem = Path::new(&st.sample_from)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model");
    let binary = Path::new(&dir).join(format!("sample_binary_from_{stem}.png"));
    let cont = Path::new(&dir).join(format!("sample_cont_from_{stem}.png"));
    save_image_grid(&binary, &samples, st.params.img_size, 20)?;
    save_image_grid(&cont, &probs, st.params.img_size, 20)?;
    info!("wrote sample grids to {dir}");
    Ok(())
}
