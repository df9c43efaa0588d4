use std::str::FromStr;

use envconfig::Envconfig;

use election_common::config::{ConsumerConfig, DatabaseConfig, EnvMsDuration, KafkaConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3311")]
    pub port: u16,

    #[envconfig(default = "1000")]
    pub poll_timeout_ms: EnvMsDuration,

    // Pause between two consumed messages
    #[envconfig(default = "200")]
    pub loop_delay_ms: EnvMsDuration,

    #[envconfig(default = "database")]
    pub candidate_source: CandidateSource,

    // Only used with CANDIDATE_SOURCE=topic
    #[envconfig(default = "3")]
    pub expected_candidates: usize,

    #[envconfig(default = "30000")]
    pub candidate_load_timeout_ms: EnvMsDuration,

    // Makes candidate assignment reproducible when set
    pub vote_seed: Option<u64>,

    #[envconfig(default = "10000")]
    pub flush_timeout_ms: EnvMsDuration,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,

    #[envconfig(nested = true)]
    pub database: DatabaseConfig,
}

impl Config {
    /// Loads the config from env, with the voter topic and group as consumer defaults.
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        ConsumerConfig::set_defaults("voting-group", election_common::VOTERS_TOPIC);
        Self::init_from_env()
    }

    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Database,
    Topic,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseCandidateSourceError(String);

impl std::fmt::Display for ParseCandidateSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown candidate source {}", self.0)
    }
}

impl FromStr for CandidateSource {
    type Err = ParseCandidateSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "database" | "db" => Ok(CandidateSource::Database),
            "topic" | "kafka" => Ok(CandidateSource::Topic),
            _ => Err(ParseCandidateSourceError(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn defaults_pace_the_loop() {
        let env = HashMap::from([
            ("KAFKA_CONSUMER_GROUP".to_owned(), "voting-group".to_owned()),
            ("KAFKA_CONSUMER_TOPIC".to_owned(), "voters_topic".to_owned()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();

        assert_eq!(config.poll_timeout_ms.0, Duration::from_secs(1));
        assert_eq!(config.loop_delay_ms.0, Duration::from_millis(200));
        assert_eq!(config.candidate_source, CandidateSource::Database);
        assert_eq!(config.vote_seed, None);
        assert_eq!(config.consumer.kafka_consumer_offset_reset, "earliest");
    }

    #[test]
    fn parses_candidate_sources() {
        assert_eq!("topic".parse(), Ok(CandidateSource::Topic));
        assert_eq!("Database".parse(), Ok(CandidateSource::Database));
        assert!("redis".parse::<CandidateSource>().is_err());
    }
}
