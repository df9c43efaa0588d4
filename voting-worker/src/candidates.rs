//! Loading the fixed candidate set the worker assigns votes from.
use std::collections::BTreeMap;
use std::time::Duration;

use election_common::config::KafkaConfig;
use election_common::kafka_consumer::{create_stream_consumer, is_partition_eof};
use election_common::messages::candidate::Candidate;
use election_common::store::ElectionStore;
use election_common::CANDIDATES_TOPIC;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CandidateSource;
use crate::error::WorkerError;

pub async fn load_candidates(
    source: CandidateSource,
    store: &ElectionStore,
    kafka: &KafkaConfig,
    expected: usize,
    timeout: Duration,
) -> Result<Vec<Candidate>, WorkerError> {
    let candidates = match source {
        CandidateSource::Database => store.load_candidates().await?,
        CandidateSource::Topic => load_candidates_from_topic(kafka, expected, timeout).await?,
    };

    if candidates.is_empty() {
        return Err(WorkerError::NoCandidates);
    }
    info!(count = candidates.len(), ?source, "loaded candidates");
    Ok(candidates)
}

/// Read `candidates_topic` from the beginning until `expected` distinct
/// candidates are seen or `timeout` elapses. A throwaway consumer group is
/// used so every worker reads the full topic.
pub async fn load_candidates_from_topic(
    kafka: &KafkaConfig,
    expected: usize,
    timeout: Duration,
) -> Result<Vec<Candidate>, WorkerError> {
    let group = format!("candidate-loader-{}", Uuid::new_v4());
    let consumer: StreamConsumer = create_stream_consumer(kafka, &group, "earliest")?;
    consumer.subscribe(&[CANDIDATES_TOPIC])?;

    let deadline = Instant::now() + timeout;
    let mut candidates = BTreeMap::new();

    while candidates.len() < expected {
        let message = match tokio::time::timeout_at(deadline, consumer.recv()).await {
            Err(_) => {
                warn!(
                    found = candidates.len(),
                    expected, "timed out waiting for candidates"
                );
                break;
            }
            Ok(Err(err)) if is_partition_eof(&err) => continue,
            Ok(Err(err)) => return Err(err.into()),
            Ok(Ok(message)) => message,
        };

        let Some(payload) = message.payload() else {
            continue;
        };
        match serde_json::from_slice::<Candidate>(payload) {
            Ok(candidate) => {
                candidates.insert(candidate.candidate_id.clone(), candidate);
            }
            Err(err) => warn!("skipping unreadable candidate message: {}", err),
        }
    }

    Ok(candidates.into_values().collect())
}
