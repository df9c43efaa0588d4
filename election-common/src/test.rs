//! Fixtures shared by the test suites of the pipeline crates.
use std::time::Duration;

use health::HealthRegistry;
use rdkafka::mocking::MockCluster;
use rdkafka::producer::{DefaultProducerContext, FutureProducer};

use crate::config::KafkaConfig;
use crate::kafka_producer::{create_kafka_producer, KafkaContext};
use crate::messages::candidate::{party_for, Candidate, CANDIDATE_BIOGRAPHY, CANDIDATE_PLATFORM};
use crate::messages::voter::{Address, Voter};

pub fn sample_voter(voter_id: &str) -> Voter {
    Voter {
        voter_id: voter_id.to_owned(),
        voter_name: "Ada Lovelace".to_owned(),
        date_of_birth: "1985-12-10T08:15:00.000Z".to_owned(),
        gender: "female".to_owned(),
        nationality: "GB".to_owned(),
        registration_number: "bluecat123".to_owned(),
        address: Address {
            street: "12 Church Road".to_owned(),
            city: "Carlisle".to_owned(),
            state: "Cumbria".to_owned(),
            country: "United Kingdom".to_owned(),
            postcode: "CA1 1AA".to_owned(),
        },
        email: "ada.lovelace@example.com".to_owned(),
        phone_number: "017687 12345".to_owned(),
        cell_number: "07700 900123".to_owned(),
        picture: "https://randomuser.me/api/portraits/women/1.jpg".to_owned(),
        registered_age: 7,
    }
}

pub fn sample_candidate(candidate_id: &str, index: usize) -> Candidate {
    Candidate {
        candidate_id: candidate_id.to_owned(),
        candidate_name: format!("Candidate {index}"),
        party_affiliation: party_for(index, 3).to_owned(),
        biography: CANDIDATE_BIOGRAPHY.to_owned(),
        campaign_platform: CANDIDATE_PLATFORM.to_owned(),
        photo_url: format!("https://randomuser.me/api/portraits/men/{index}.jpg"),
    }
}

pub fn mock_kafka_config(cluster: &MockCluster<'static, DefaultProducerContext>) -> KafkaConfig {
    KafkaConfig {
        kafka_producer_linger_ms: 0,
        kafka_producer_queue_mib: 50,
        kafka_message_timeout_ms: 5000,
        kafka_compression_codec: "none".to_string(),
        kafka_hosts: cluster.bootstrap_servers(),
        kafka_tls: false,
    }
}

/// Starts an in-process mock broker with the given topics and a producer connected to it.
pub async fn create_mock_kafka(
    topics: &[&str],
) -> (
    MockCluster<'static, DefaultProducerContext>,
    FutureProducer<KafkaContext>,
) {
    let registry = HealthRegistry::new("liveness");
    let handle = registry.register("producer", Duration::from_secs(30));
    let cluster = MockCluster::new(1).expect("failed to create mock brokers");
    for topic in topics {
        cluster
            .create_topic(topic, 1, 1)
            .expect("failed to create mock topic");
    }

    let config = mock_kafka_config(&cluster);
    let producer = create_kafka_producer(&config, handle)
        .await
        .expect("failed to create mocked kafka producer");

    (cluster, producer)
}
