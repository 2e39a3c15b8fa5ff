pub mod branch_opt_util;
pub mod environment;
pub mod error;
pub mod paillier;
pub mod params;
pub mod persist;
pub mod score_store;
pub mod timer;
