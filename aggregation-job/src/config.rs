use std::path::PathBuf;
use std::time::Duration;

use envconfig::Envconfig;

use election_common::config::{DatabaseConfig, EnvMsDuration, KafkaConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3312")]
    pub port: u16,

    #[envconfig(default = "votes_topic")]
    pub source_topic: String,

    // One checkpoint file per pipeline is kept in this directory
    #[envconfig(default = "checkpoints")]
    pub checkpoint_dir: String,

    #[envconfig(default = "60000")]
    pub watermark_delay_ms: EnvMsDuration,

    // Tumbling window length, 0 keeps running totals since the start
    #[envconfig(default = "0")]
    pub window_secs: u64,

    #[envconfig(default = "1000")]
    pub trigger_interval_ms: EnvMsDuration,

    #[envconfig(default = "1000")]
    pub max_batch_size: usize,

    #[envconfig(default = "5000")]
    pub restart_backoff_ms: EnvMsDuration,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub database: DatabaseConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn window(&self) -> Option<Duration> {
        match self.window_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        PathBuf::from(&self.checkpoint_dir)
    }
}
