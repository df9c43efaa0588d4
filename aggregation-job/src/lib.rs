pub mod aggregate;
pub mod checkpoint;
pub mod config;
pub mod metrics_consts;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod watermark;
