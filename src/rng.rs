use rand::{rngs::StdRng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};

static BASE_SEED: AtomicU64 = AtomicU64::new(0);
static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fix the process-wide base seed.  Called once during config assembly so
/// every later [`rng_from_env`] stream is reproducible for a given run.
pub fn set_base_seed(seed: u64) {
    BASE_SEED.store(seed, Ordering::SeqCst);
    COUNTER.store(0, Ordering::SeqCst);
}

/// Create a [`StdRng`] derived from the run seed.
///
/// The base seed comes from [`set_base_seed`], falling back to the `SEED`
/// environment variable.  Each call mixes in an incrementing counter to
/// yield deterministic yet distinct streams.
pub fn rng_from_env() -> StdRng {
    let mut base = BASE_SEED.load(Ordering::SeqCst);
    if base == 0 {
        base = std::env::var("SEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
    }
    let idx = COUNTER.fetch_add(1, Ordering::SeqCst);
    StdRng::seed_from_u64(base.wrapping_add(idx))
}
