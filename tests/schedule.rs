use lagvae::optim::{DecayDecision, PlateauDecay};
use lagvae::train::{AggressiveControl, BurnState, KlAnneal, MAX_AGGRESSIVE_STEPS};

#[test]
fn kl_weight_is_monotone_and_capped() {
    let mut anneal = KlAnneal::new(0.1, 2, 5);
    let mut prev = 0.0f32;
    for _ in 0..30 {
        let w = anneal.step();
        assert!(w >= prev, "kl weight decreased: {w} < {prev}");
        assert!(w <= 1.0, "kl weight above 1.0: {w}");
        prev = w;
    }
    // warm-up is 2 epochs x 5 batches; well past it the weight sits at 1.0
    assert!((prev - 1.0).abs() < 1e-5);
}

#[test]
fn kl_weight_stays_at_one_without_annealing() {
    let mut anneal = KlAnneal::new(1.0, 10, 100);
    for _ in 0..5 {
        assert_eq!(anneal.step(), 1.0);
    }
}

#[test]
fn burn_loop_never_exceeds_the_cap() {
    let mut burn = BurnState::new();
    let mut steps = 0usize;
    // strictly decreasing loss: only the cap can stop the loop
    let mut loss = 1000.0f32;
    loop {
        steps += 1;
        loss *= 0.9;
        if !burn.observe(loss, 10) {
            break;
        }
    }
    assert!(steps < MAX_AGGRESSIVE_STEPS);
}

#[test]
fn burn_loop_stops_when_block_average_rises() {
    let mut burn = BurnState::new();
    let mut steps = 0usize;
    loop {
        steps += 1;
        // first block averages 1.0 per example, second block 2.0
        let loss = if steps <= 10 { 10.0 } else { 20.0 };
        if !burn.observe(loss, 10) {
            break;
        }
    }
    assert_eq!(steps, 20);
}

#[test]
fn aggressive_disables_after_five_and_never_reenables() {
    let mut ctl = AggressiveControl::new(true);
    for _ in 0..4 {
        assert!(ctl.observe(-1.0));
    }
    assert!(!ctl.observe(-1.0));
    // large improvements afterwards must not bring it back
    assert!(!ctl.observe(100.0));
    assert!(!ctl.enabled());
}

#[test]
fn aggressive_counter_resets_on_improvement() {
    let mut ctl = AggressiveControl::new(true);
    for _ in 0..4 {
        assert!(ctl.observe(-1.0));
    }
    // improvement over the initial best of 0.0 clears the streak
    assert!(ctl.observe(1.0));
    for _ in 0..4 {
        assert!(ctl.observe(0.5));
    }
    assert!(!ctl.observe(0.5));
}

#[test]
fn aggressive_stays_off_when_disabled_from_the_start() {
    let mut ctl = AggressiveControl::new(false);
    assert!(!ctl.enabled());
    assert!(!ctl.observe(5.0));
}

#[test]
fn plateau_halves_on_the_configured_cadence() {
    let mut decay = PlateauDecay::new(1.0, 0.5, 2, 5);
    let best = 10.0f32;
    assert_eq!(decay.observe(11.0, best), DecayDecision::Continue);
    assert_eq!(
        decay.observe(11.0, best),
        DecayDecision::Decay { new_lr: 0.5 }
    );
    assert_eq!(decay.lr(), 0.5);
    assert_eq!(decay.decay_count(), 1);
}

#[test]
fn plateau_window_resets_on_improvement() {
    let mut decay = PlateauDecay::new(1.0, 0.5, 2, 5);
    let best = 10.0f32;
    assert_eq!(decay.observe(11.0, best), DecayDecision::Continue);
    // loss at or below best clears the streak
    assert_eq!(decay.observe(10.0, best), DecayDecision::Continue);
    assert_eq!(decay.observe(11.0, best), DecayDecision::Continue);
    assert_eq!(decay.lr(), 1.0);
}

#[test]
fn plateau_exhausts_after_max_decays() {
    let mut decay = PlateauDecay::new(1.0, 0.5, 1, 5);
    let best = 10.0f32;
    for i in 1..=5 {
        match decay.observe(11.0, best) {
            DecayDecision::Decay { new_lr } => {
                assert!((new_lr - 0.5f32.powi(i)).abs() < 1e-6);
            }
            DecayDecision::Continue => panic!("expected a decay every epoch"),
        }
    }
    assert!(decay.exhausted());
}
