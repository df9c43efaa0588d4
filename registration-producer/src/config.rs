use envconfig::Envconfig;

use election_common::config::{DatabaseConfig, EnvMsDuration, KafkaConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3310")]
    pub port: u16,

    #[envconfig(default = "https://randomuser.me/api/?nat=gb")]
    pub identity_url: String,

    #[envconfig(default = "5000")]
    pub identity_timeout_ms: EnvMsDuration,

    #[envconfig(default = "3")]
    pub candidate_count: usize,

    // 0 keeps registering until the process is stopped
    #[envconfig(default = "1000")]
    pub voter_count: usize,

    #[envconfig(default = "100")]
    pub voter_interval_ms: EnvMsDuration,

    #[envconfig(default = "10000")]
    pub flush_timeout_ms: EnvMsDuration,

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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn defaults_register_a_thousand_voters() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();

        assert_eq!(config.identity_url, "https://randomuser.me/api/?nat=gb");
        assert_eq!(config.identity_timeout_ms.0, Duration::from_secs(5));
        assert_eq!(config.candidate_count, 3);
        assert_eq!(config.voter_count, 1000);
        assert_eq!(config.voter_interval_ms.0, Duration::from_millis(100));
        assert_eq!(config.kafka.kafka_hosts, "localhost:9092");
        assert_eq!(config.bind(), "0.0.0.0:3310");
    }
}
