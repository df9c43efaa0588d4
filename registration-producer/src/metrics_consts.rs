pub const CANDIDATES_REGISTERED: &str = "election_candidates_registered_total";
pub const VOTERS_REGISTERED: &str = "election_voters_registered_total";
pub const VOTERS_ALREADY_REGISTERED: &str = "election_voters_already_registered_total";
pub const IDENTITY_FETCH_FAILED: &str = "election_identity_fetch_failed_total";
pub const STORE_WRITE_FAILED: &str = "election_registration_store_failed_total";
pub const PUBLISH_FAILED: &str = "election_registration_publish_failed_total";
pub const REGISTRATION_TIME: &str = "election_voter_registration_ms";
