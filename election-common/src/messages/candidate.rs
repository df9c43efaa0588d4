use serde::{Deserialize, Serialize};

/// Party names, assigned to candidates round-robin by bootstrap index.
pub const PARTIES: [&str; 3] = ["Management Party", "Savior Party", "Tech Republic Party"];

pub const CANDIDATE_BIOGRAPHY: &str = "A brief bio of the candidate.";
pub const CANDIDATE_PLATFORM: &str = "Key campaign promises or platform.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Candidate {
    pub candidate_id: String,
    pub candidate_name: String,
    pub party_affiliation: String,
    pub biography: String,
    pub campaign_platform: String,
    pub photo_url: String,
}

/// Party for the candidate at `index` out of `total`: `PARTIES[index % total]`.
/// `total` is clamped to the number of known parties so the lookup never goes
/// out of bounds.
pub fn party_for(index: usize, total: usize) -> &'static str {
    let total = total.clamp(1, PARTIES.len());
    PARTIES[index % total]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_assignment_is_round_robin() {
        assert_eq!(party_for(0, 3), "Management Party");
        assert_eq!(party_for(1, 3), "Savior Party");
        assert_eq!(party_for(2, 3), "Tech Republic Party");
        assert_eq!(party_for(3, 3), "Management Party");
        assert_eq!(party_for(7, 3), party_for(7, 3));
    }

    #[test]
    fn fewer_candidates_use_fewer_parties() {
        assert_eq!(party_for(0, 2), "Management Party");
        assert_eq!(party_for(1, 2), "Savior Party");
        assert_eq!(party_for(2, 2), "Management Party");
    }

    #[test]
    fn oversized_totals_never_panic() {
        assert_eq!(party_for(4, 10), "Savior Party");
        assert_eq!(party_for(5, 0), "Management Party");
    }
}
