use election_common::store::StoreError;
use rdkafka::error::KafkaError;
use thiserror::Error;

/// Errors that stop the worker from starting or streaming.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("no candidates are registered, nothing to vote for")]
    NoCandidates,
    #[error("failed to load candidates: {0}")]
    StoreError(#[from] StoreError),
    #[error("kafka consumer failed: {0}")]
    KafkaError(#[from] KafkaError),
}

/// Why a single voter message did not produce a recorded vote.
#[derive(Error, Debug)]
pub enum VoteError {
    #[error("voter message has no payload")]
    EmptyPayload,
    #[error("failed to parse voter message: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("failed to record vote: {0}")]
    StoreError(#[from] StoreError),
}
