pub mod config;
pub mod data;
pub mod eval;
pub mod layers;
pub mod logging;
pub mod math;
pub mod models;
pub mod optim;
pub mod rng;
pub mod train;
pub mod util;
pub mod weights;
