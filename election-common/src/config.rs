use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use sqlx::postgres::PgConnectOptions;

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32, // Size of the in-memory producer queue in mebibytes

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message: 20 seconds

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,
}

#[derive(Envconfig, Clone)]
pub struct ConsumerConfig {
    pub kafka_consumer_group: String,
    pub kafka_consumer_topic: String,

    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest
}

impl ConsumerConfig {
    /// Each binary consumes a different topic with a different group, so the
    /// defaults are set here before the binary's config struct is loaded.
    pub fn set_defaults(consumer_group: &str, consumer_topic: &str) {
        if std::env::var("KAFKA_CONSUMER_GROUP").is_err() {
            std::env::set_var("KAFKA_CONSUMER_GROUP", consumer_group);
        };
        if std::env::var("KAFKA_CONSUMER_TOPIC").is_err() {
            std::env::set_var("KAFKA_CONSUMER_TOPIC", consumer_topic);
        };
    }
}

#[derive(Envconfig, Clone)]
pub struct DatabaseConfig {
    #[envconfig(from = "DB_HOST", default = "localhost")]
    pub host: String,

    #[envconfig(from = "DB_PORT", default = "5432")]
    pub port: u16,

    #[envconfig(from = "DB_NAME", default = "voting")]
    pub name: String,

    #[envconfig(from = "DB_USER", default = "postgres")]
    pub user: String,

    #[envconfig(from = "DB_PASS", default = "postgres")]
    pub password: String,

    #[envconfig(default = "10")]
    pub max_pg_connections: u32,
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user)
            .password(&self.password)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_millisecond_durations() {
        let parsed: EnvMsDuration = "1500".parse().unwrap();
        assert_eq!(parsed.0, time::Duration::from_millis(1500));

        assert_eq!(
            "1.5s".parse::<EnvMsDuration>().unwrap_err(),
            ParseEnvMsDurationError
        );
    }

    #[test]
    fn database_defaults_target_local_postgres() {
        let config = DatabaseConfig::init_from_hashmap(&Default::default()).unwrap();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.name, "voting");
        assert_eq!(config.user, "postgres");
        assert_eq!(config.password, "postgres");
    }
}
