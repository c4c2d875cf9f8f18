use lagvae::config::{params_for, Domain, Settings, SEED_TABLE};

fn args(list: &[&str]) -> impl Iterator<Item = String> {
    list.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .into_iter()
}

#[test]
fn registry_knows_the_four_datasets() {
    for (name, domain) in [
        ("mnist", Domain::Image),
        ("omniglot", Domain::Image),
        ("yahoo", Domain::Text),
        ("yelp", Domain::Text),
    ] {
        let p = params_for(name).unwrap();
        assert_eq!(p.domain, domain);
        assert!(p.batch_size > 0);
        assert!(p.nz > 0);
    }
    assert!(params_for("cifar").is_none());
}

#[test]
fn text_and_image_variants_use_their_own_optimizer_settings() {
    let image = params_for("omniglot").unwrap();
    let text = params_for("yahoo").unwrap();
    assert_eq!(image.decay_epoch, 20);
    assert_eq!(text.decay_epoch, 2);
    assert!(image.lr < text.lr);
}

#[test]
fn run_id_encodes_the_experiment_variant() {
    let st = Settings::from_args(args(&[
        "--dataset",
        "mnist",
        "--aggressive",
        "1",
        "--kl_start",
        "0.1",
    ]))
    .unwrap();
    assert_eq!(st.run_id(), "mnist_aggressive1_ns1_kls0.1_warm10_0_0_783435");
    assert_eq!(
        st.save_path,
        "models/mnist/mnist_aggressive1_ns1_kls0.1_warm10_0_0_783435.json"
    );
    assert_eq!(st.samples_dir(), "samples/mnist");
}

#[test]
fn taskid_selects_the_seed_from_the_table() {
    let st = Settings::from_args(args(&["--dataset", "yahoo", "--taskid", "3"])).unwrap();
    assert_eq!(st.seed, SEED_TABLE[3]);
    assert_eq!(st.seed, 303);
}

#[test]
fn missing_dataset_is_rejected() {
    assert!(Settings::from_args(args(&["--nsamples", "2"])).is_err());
}

#[test]
fn unknown_dataset_is_rejected() {
    assert!(Settings::from_args(args(&["--dataset", "imagenet"])).is_err());
}

#[test]
fn unknown_flags_are_rejected() {
    assert!(Settings::from_args(args(&["--dataset", "mnist", "--frobnicate"])).is_err());
}

#[test]
fn aggressive_flag_follows_the_nonzero_convention() {
    let off = Settings::from_args(args(&["--dataset", "mnist", "--aggressive", "0"])).unwrap();
    assert!(!off.aggressive);
    let on = Settings::from_args(args(&["--dataset", "mnist", "--aggressive", "2"])).unwrap();
    assert!(on.aggressive);
}
