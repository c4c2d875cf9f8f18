use lagvae::config::{Domain, Settings};
use lagvae::data::{TextData, BOS, EOS};
use lagvae::eval;
use lagvae::models::{LstmDecoder, LstmEncoder, TextVae, Vae};
use lagvae::train;
use lagvae::weights;
use lagvae::{error, info};
use std::io;
use std::process;

mod common;

fn main() {
    let Some(st) = common::settings_from_env() else {
        process::exit(2);
    };
    if st.params.domain != Domain::Text {
        error!("dataset `{}` is not a text dataset", st.dataset);
        process::exit(2);
    }
    info!("{st:?}");

    let p = &st.params;
    let data = match TextData::load(&st.dataset, &p.data_dir, p.batch_size) {
        Ok(d) => d,
        Err(e) => {
            error!("failed to load dataset `{}`: {e}", st.dataset);
            process::exit(1);
        }
    };
    info!("vocab size: {}", data.vocab.len());

    let mut vae: TextVae = Vae::new(
        LstmEncoder::new(data.vocab.len(), p.ni, p.enc_nh, p.nz),
        LstmDecoder::new(
            data.vocab.len(),
            p.ni,
            p.dec_nh,
            p.nz,
            p.dropout_in,
            p.dropout_out,
        ),
        p.nz,
    );

    if !st.sample_from.is_empty() {
        if let Err(e) = sample(&mut vae, &data, &st) {
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
        eval::evaluate(&vae, &data.test, "TEST", st.nsamples);
        let (au, _) = eval::calc_au(&vae, &data.test, eval::AU_DELTA);
        info!("{au} active units");
        eval::calc_iwnll(&vae, &data.test, st.iw_nsamples);
        return;
    }

    match train::run(&mut vae, &data.train, &data.val, &data.test, &st) {
        Ok(_) => {
            eval::calc_iwnll(&vae, &data.test, st.iw_nsamples);
        }
        Err(e) => {
            error!("training failed: {e}");
            process::exit(1);
        }
    }
}

/// Load a checkpoint and greedily decode a handful of prior samples.
fn sample(vae: &mut TextVae, data: &TextData, st: &Settings) -> io::Result<()> {
    weights::load_vae(&st.sample_from, vae)?;
    let z = vae.sample_from_prior(10);
    let sents = vae.decoder.decode_greedy(&z, BOS, EOS, 100);
    for ids in sents {
        let words: Vec<&str> = ids.iter().map(|&id| data.vocab.word(id)).collect();
        info!("{}", words.join(" "));
    }
    Ok(())
}
