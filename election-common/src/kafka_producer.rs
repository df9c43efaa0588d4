use std::time::Duration;

use health::HealthHandle;
use metrics::{counter, gauge};
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{ClientConfig, ClientContext};
use serde::Serialize;
use serde_json::error::Error as SerdeError;
use thiserror::Error;
use tracing::{debug, error, info};

pub struct KafkaContext {
    liveness: HealthHandle,
}

impl From<HealthHandle> for KafkaContext {
    fn from(value: HealthHandle) -> Self {
        KafkaContext { liveness: value }
    }
}

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        // The stats callback only runs while the rdkafka main loop is alive
        self.liveness.report_healthy();

        gauge!("election_kafka_producer_queue_depth").set(stats.msg_cnt as f64);
        gauge!("election_kafka_producer_queue_depth_limit").set(stats.msg_max as f64);
        gauge!("election_kafka_callback_queue_depth").set(stats.replyq as f64);
    }
}

pub async fn create_kafka_producer(
    config: &crate::config::KafkaConfig,
    liveness: HealthHandle,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000")
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        )
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        );

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    debug!("rdkafka configuration: {:?}", client_config);
    let producer: FutureProducer<KafkaContext> =
        client_config.create_with_context(liveness.into())?;

    // "Ping" the brokers so a bad bootstrap address fails at startup
    match producer
        .client()
        .fetch_metadata(None, Duration::from_secs(15))
    {
        Ok(metadata) => {
            info!(
                "connected to Kafka brokers, found {} topics",
                metadata.topics().len()
            );
        }
        Err(error) => {
            error!("failed to fetch metadata from Kafka brokers: {:?}", error);
            return Err(error);
        }
    }

    Ok(producer)
}

#[derive(Error, Debug)]
pub enum KafkaProduceError {
    #[error("failed to serialize: {error}")]
    SerializationError { error: SerdeError },
    #[error("failed to produce to kafka: {error}")]
    KafkaProduceError { error: KafkaError },
    #[error("failed to produce to kafka (timeout)")]
    KafkaProduceCanceled,
}

/// Serialize `item` as JSON and produce it to `topic`, waiting for the broker ack.
pub async fn send_to_kafka<T, C>(
    producer: &FutureProducer<C>,
    topic: &str,
    key: Option<&str>,
    item: &T,
) -> Result<(), KafkaProduceError>
where
    T: Serialize + ?Sized,
    C: ClientContext + 'static,
{
    let payload = serde_json::to_string(item)
        .map_err(|error| KafkaProduceError::SerializationError { error })?;

    let record = FutureRecord {
        topic,
        key,
        payload: Some(&payload),
        timestamp: None,
        partition: None,
        headers: None,
    };

    let delivery = producer
        .send_result(record)
        .map_err(|(error, _)| KafkaProduceError::KafkaProduceError { error })?;

    let result = match delivery.await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err((error, _))) => Err(KafkaProduceError::KafkaProduceError { error }),
        Err(_) => Err(KafkaProduceError::KafkaProduceCanceled),
    };

    let outcome = if result.is_ok() { "success" } else { "failure" };
    counter!("election_kafka_produced_total", "topic" => topic.to_owned(), "outcome" => outcome)
        .increment(1);

    result
}

/// Produce every item of `iter` without keys. All sends are queued before any
/// ack is awaited; results come back in input order.
pub async fn send_iter_to_kafka<T, C>(
    producer: &FutureProducer<C>,
    topic: &str,
    iter: impl IntoIterator<Item = T>,
) -> Vec<Result<(), KafkaProduceError>>
where
    T: Serialize,
    C: ClientContext + 'static,
{
    let mut results = Vec::new();
    let mut handles = Vec::new();

    for (index, item) in iter.into_iter().enumerate() {
        let payload = match serde_json::to_string(&item) {
            Ok(payload) => payload,
            Err(error) => {
                results.push((index, Err(KafkaProduceError::SerializationError { error })));
                continue;
            }
        };

        let record: FutureRecord<'_, str, String> = FutureRecord {
            topic,
            key: None,
            payload: Some(&payload),
            timestamp: None,
            partition: None,
            headers: None,
        };

        match producer.send_result(record) {
            Ok(delivery) => handles.push((index, delivery)),
            Err((error, _)) => {
                results.push((index, Err(KafkaProduceError::KafkaProduceError { error })))
            }
        }
    }

    for (index, delivery) in handles {
        let result = match delivery.await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err((error, _))) => Err(KafkaProduceError::KafkaProduceError { error }),
            Err(_) => Err(KafkaProduceError::KafkaProduceCanceled),
        };
        results.push((index, result));
    }

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}

/// Drain the producer queue before the process exits.
pub fn flush_producer<C: ClientContext + 'static>(producer: &FutureProducer<C>, timeout: Duration) {
    match producer.flush(timeout) {
        Ok(()) => info!("kafka producer flushed"),
        Err(error) => error!("failed to flush kafka producer: {}", error),
    }
}
