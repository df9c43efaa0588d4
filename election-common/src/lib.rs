pub mod config;
pub mod identity;
pub mod kafka_consumer;
pub mod kafka_producer;
pub mod messages;
pub mod metrics;
pub mod shutdown;
pub mod store;
pub mod test;

pub const VOTERS_TOPIC: &str = "voters_topic";
pub const CANDIDATES_TOPIC: &str = "candidates_topic";
pub const VOTES_TOPIC: &str = "votes_topic";
pub const VOTES_PER_CANDIDATE_TOPIC: &str = "aggregated_votes_per_candidate";
pub const TURNOUT_BY_LOCATION_TOPIC: &str = "aggregated_turnout_by_location";
