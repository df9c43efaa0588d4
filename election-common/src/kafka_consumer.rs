use rdkafka::consumer::StreamConsumer;
use rdkafka::error::KafkaError;
use rdkafka::ClientConfig;
use tracing::debug;

use crate::config::KafkaConfig;

/// Client configuration shared by every consumer in the pipeline. Offsets are
/// never auto-committed: consumers commit (or checkpoint) only what they have
/// finished processing.
pub fn consumer_client_config(
    common_config: &KafkaConfig,
    group_id: &str,
    offset_reset: &str,
) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &common_config.kafka_hosts)
        .set("statistics.interval.ms", "10000")
        .set("group.id", group_id)
        .set("auto.offset.reset", offset_reset)
        .set("enable.auto.commit", "false")
        .set("enable.auto.offset.store", "false")
        .set("enable.partition.eof", "true");

    if common_config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    client_config
}

pub fn create_stream_consumer(
    common_config: &KafkaConfig,
    group_id: &str,
    offset_reset: &str,
) -> Result<StreamConsumer, KafkaError> {
    let client_config = consumer_client_config(common_config, group_id, offset_reset);
    debug!("rdkafka consumer configuration: {:?}", client_config);
    client_config.create()
}

/// Partition EOF is reported through the error channel but only means the
/// consumer caught up with the log end.
pub fn is_partition_eof(error: &KafkaError) -> bool {
    matches!(
        error,
        KafkaError::PartitionEOF(_)
            | KafkaError::MessageConsumption(rdkafka::types::RDKafkaErrorCode::PartitionEOF)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::types::RDKafkaErrorCode;

    #[test]
    fn partition_eof_is_not_a_failure() {
        assert!(is_partition_eof(&KafkaError::PartitionEOF(0)));
        assert!(is_partition_eof(&KafkaError::MessageConsumption(
            RDKafkaErrorCode::PartitionEOF
        )));
        assert!(!is_partition_eof(&KafkaError::MessageConsumption(
            RDKafkaErrorCode::UnknownTopicOrPartition
        )));
    }
}
