use lagvae::models::{LstmDecoder, LstmEncoder, TextVae, Vae};
use lagvae::weights::{load_vae, save_vae};

fn small_text_vae(nz: usize) -> TextVae {
    Vae::new(
        LstmEncoder::new(12, 4, 6, nz),
        LstmDecoder::new(12, 4, 6, nz, 0.0, 0.0),
        nz,
    )
}

#[test]
fn checkpoint_roundtrip_restores_every_matrix() {
    let dir = std::env::temp_dir().join("lagvae_ckpt_roundtrip");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("model.json");
    let path = path.to_str().unwrap();

    let mut original = small_text_vae(3);
    save_vae(path, &mut original).unwrap();

    // a freshly initialized model has different random weights
    let mut restored = small_text_vae(3);
    load_vae(path, &mut restored).unwrap();

    let orig_params = original.parameters();
    let rest_params = restored.parameters();
    assert_eq!(orig_params.len(), rest_params.len());
    for (a, b) in orig_params.iter().zip(rest_params.iter()) {
        assert_eq!(a.w, b.w);
    }
}

#[test]
fn checkpoint_rejects_a_mismatched_architecture() {
    let dir = std::env::temp_dir().join("lagvae_ckpt_mismatch");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("model.json");
    let path = path.to_str().unwrap();

    let mut original = small_text_vae(3);
    save_vae(path, &mut original).unwrap();

    let mut other = small_text_vae(5);
    assert!(load_vae(path, &mut other).is_err());
}

#[test]
fn missing_checkpoint_is_an_error() {
    let mut vae = small_text_vae(3);
    assert!(load_vae("/nonexistent/lagvae/model.json", &mut vae).is_err());
}
