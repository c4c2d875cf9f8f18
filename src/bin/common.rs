use lagvae::config::Settings;
use std::env;

/// Parse the shared experiment flags, printing usage on failure.
pub fn settings_from_env() -> Option<Settings> {
    match Settings::from_args(env::args().skip(1)) {
        Ok(s) => Some(s),
        Err(e) => {
            eprintln!("{e}");
            eprintln!(
                "usage: --dataset <name> [--nsamples N] [--iw_nsamples N] [--eval] \
                 [--load_path P] [--warm_up N] [--kl_start F] [--aggressive 0|1] \
                 [--seed N] [--sample_from P] [--jobid N] [--taskid N] [--config P]"
            );
            None
        }
    }
}
