pub const VOTES_RECORDED: &str = "election_votes_recorded_total";
pub const DUPLICATE_VOTES: &str = "election_duplicate_votes_total";
pub const INVALID_VOTERS: &str = "election_invalid_voter_messages_total";
pub const VOTE_STORE_FAILED: &str = "election_vote_store_failed_total";
pub const VOTE_PUBLISH_FAILED: &str = "election_vote_publish_failed_total";
pub const CONSUMER_ERRORS: &str = "election_voter_consumer_errors_total";
pub const OFFSET_COMMIT_FAILED: &str = "election_voter_offset_commit_failed_total";
pub const VOTE_PROCESSING_TIME: &str = "election_vote_processing_ms";
