pub mod candidates;
pub mod config;
pub mod error;
pub mod metrics_consts;
pub mod worker;
