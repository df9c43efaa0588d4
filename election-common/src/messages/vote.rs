use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::candidate::Candidate;
use super::voter::{Address, Voter};
use super::{deserialize_datetime, serialize_datetime};

/// Weight of a single ballot.
pub const VOTE_WEIGHT: i32 = 1;

/// The enriched vote published on `votes_topic`: the voter, the candidate they
/// were assigned, and the ballot itself, flattened into one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter_id: String,
    pub voter_name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub nationality: String,
    pub registration_number: String,
    pub address: Address,
    pub email: String,
    pub phone_number: String,
    pub cell_number: String,
    pub picture: String,
    pub registered_age: i32,

    pub candidate_id: String,
    pub candidate_name: String,
    pub party_affiliation: String,
    pub biography: String,
    pub campaign_platform: String,
    pub photo_url: String,

    pub vote_id: Uuid,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime"
    )]
    pub voting_time: DateTime<Utc>,
    pub vote: i32,
}

impl VoteRecord {
    pub fn new(
        voter: Voter,
        candidate: &Candidate,
        vote_id: Uuid,
        voting_time: DateTime<Utc>,
    ) -> Self {
        let Voter {
            voter_id,
            voter_name,
            date_of_birth,
            gender,
            nationality,
            registration_number,
            address,
            email,
            phone_number,
            cell_number,
            picture,
            registered_age,
        } = voter;

        Self {
            voter_id,
            voter_name,
            date_of_birth,
            gender,
            nationality,
            registration_number,
            address,
            email,
            phone_number,
            cell_number,
            picture,
            registered_age,
            candidate_id: candidate.candidate_id.clone(),
            candidate_name: candidate.candidate_name.clone(),
            party_affiliation: candidate.party_affiliation.clone(),
            biography: candidate.biography.clone(),
            campaign_platform: candidate.campaign_platform.clone(),
            photo_url: candidate.photo_url.clone(),
            vote_id,
            voting_time,
            vote: VOTE_WEIGHT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{sample_candidate, sample_voter};
    use chrono::TimeZone;

    #[test]
    fn test_vote_record_serialization() {
        let voter = sample_voter("voter-1");
        let candidate = sample_candidate("candidate-1", 0);
        let vote_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655447777").unwrap();
        let voting_time = Utc.with_ymd_and_hms(2024, 6, 1, 12, 2, 0).unwrap();

        let record = VoteRecord::new(voter, &candidate, vote_id, voting_time);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["voter_id"], "voter-1");
        assert_eq!(value["candidate_id"], "candidate-1");
        assert_eq!(value["party_affiliation"], "Management Party");
        assert_eq!(value["address"]["state"], "Cumbria");
        assert_eq!(value["vote_id"], "550e8400-e29b-41d4-a716-446655447777");
        assert_eq!(value["voting_time"], "2024-06-01 12:02:00");
        assert_eq!(value["vote"], 1);

        let parsed: VoteRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn voter_and_candidate_fields_do_not_collide() {
        let mut voter = sample_voter("voter-1");
        voter.picture = "https://example.com/voter.jpg".to_owned();
        let mut candidate = sample_candidate("candidate-1", 1);
        candidate.photo_url = "https://example.com/candidate.jpg".to_owned();

        let record = VoteRecord::new(voter, &candidate, Uuid::new_v4(), Utc::now());

        assert_eq!(record.picture, "https://example.com/voter.jpg");
        assert_eq!(record.photo_url, "https://example.com/candidate.jpg");
        assert_eq!(record.party_affiliation, "Savior Party");
    }
}
