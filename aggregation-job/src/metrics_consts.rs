pub const EVENTS_CONSUMED: &str = "election_aggregation_events_consumed_total";
pub const EVENTS_UNDECODABLE: &str = "election_aggregation_events_undecodable_total";
pub const EVENTS_LATE: &str = "election_aggregation_events_late_total";
pub const BATCHES_COMMITTED: &str = "election_aggregation_batches_total";
pub const ROWS_EMITTED: &str = "election_aggregation_rows_emitted_total";
pub const GROUPS_EVICTED: &str = "election_aggregation_groups_evicted_total";
pub const STATE_GROUPS: &str = "election_aggregation_state_groups";
pub const PIPELINE_RESTARTS: &str = "election_aggregation_pipeline_restarts_total";
pub const BATCH_TIME: &str = "election_aggregation_batch_ms";
