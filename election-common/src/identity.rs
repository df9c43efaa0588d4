//! Synthetic voter and candidate profiles from a randomized-identity HTTP service.
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::error;

use crate::messages::candidate::{party_for, Candidate, CANDIDATE_BIOGRAPHY, CANDIDATE_PLATFORM};
use crate::messages::voter::{Address, Voter};

const USER_AGENT: &str = "election-pipeline";

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("identity request failed with: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("identity service returned status {0}")]
    UnexpectedStatus(StatusCode),
    #[error("failed to parse identity response: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("identity service returned no results")]
    EmptyResults,
}

#[derive(Deserialize)]
struct RandomUserResponse {
    results: Vec<RandomUser>,
}

#[derive(Deserialize)]
struct RandomUser {
    login: Login,
    name: Name,
    dob: DateOfBirth,
    gender: String,
    nat: String,
    location: Location,
    email: String,
    phone: String,
    cell: String,
    picture: Picture,
    registered: Registered,
}

#[derive(Deserialize)]
struct Login {
    uuid: String,
    username: String,
}

#[derive(Deserialize)]
struct Name {
    first: String,
    last: String,
}

impl Name {
    fn full(&self) -> String {
        format!("{} {}", self.first, self.last)
    }
}

#[derive(Deserialize)]
struct DateOfBirth {
    date: String,
}

#[derive(Deserialize)]
struct Location {
    street: Street,
    city: String,
    state: String,
    country: String,
    postcode: Postcode,
}

#[derive(Deserialize)]
struct Street {
    number: i64,
    name: String,
}

/// Some nationalities return numeric postcodes.
#[derive(Deserialize)]
#[serde(untagged)]
enum Postcode {
    Text(String),
    Number(i64),
}

impl From<Postcode> for String {
    fn from(postcode: Postcode) -> Self {
        match postcode {
            Postcode::Text(text) => text,
            Postcode::Number(number) => number.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct Picture {
    large: String,
}

#[derive(Deserialize)]
struct Registered {
    age: i32,
}

impl From<RandomUser> for Voter {
    fn from(user: RandomUser) -> Self {
        let voter_name = user.name.full();
        let location = user.location;
        Voter {
            voter_id: user.login.uuid,
            voter_name,
            date_of_birth: user.dob.date,
            gender: user.gender,
            nationality: user.nat,
            registration_number: user.login.username,
            address: Address {
                street: format!("{} {}", location.street.number, location.street.name),
                city: location.city,
                state: location.state,
                country: location.country,
                postcode: location.postcode.into(),
            },
            email: user.email,
            phone_number: user.phone,
            cell_number: user.cell,
            picture: user.picture.large,
            registered_age: user.registered.age,
        }
    }
}

/// Gender requested for the candidate at `index`: odd indexes are female.
pub fn candidate_gender(index: usize) -> &'static str {
    if index % 2 == 1 {
        "female"
    } else {
        "male"
    }
}

#[derive(Clone)]
pub struct IdentityGenerator {
    client: reqwest::Client,
    base_url: String,
}

impl IdentityGenerator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_owned(),
        })
    }

    /// A fresh voter profile, or `None` when the identity service could not provide one.
    pub async fn generate_voter(&self) -> Option<Voter> {
        match self.fetch_voter().await {
            Ok(voter) => Some(voter),
            Err(err) => {
                error!("failed to fetch voter data: {}", err);
                None
            }
        }
    }

    pub async fn generate_candidate(&self, index: usize, total: usize) -> Option<Candidate> {
        match self.fetch_candidate(index, total).await {
            Ok(candidate) => Some(candidate),
            Err(err) => {
                error!(index, "failed to fetch candidate data: {}", err);
                None
            }
        }
    }

    pub async fn fetch_voter(&self) -> Result<Voter, IdentityError> {
        self.fetch_user(None).await.map(Voter::from)
    }

    pub async fn fetch_candidate(
        &self,
        index: usize,
        total: usize,
    ) -> Result<Candidate, IdentityError> {
        let user = self.fetch_user(Some(candidate_gender(index))).await?;

        Ok(Candidate {
            candidate_id: user.login.uuid,
            candidate_name: user.name.full(),
            party_affiliation: party_for(index, total).to_owned(),
            biography: CANDIDATE_BIOGRAPHY.to_owned(),
            campaign_platform: CANDIDATE_PLATFORM.to_owned(),
            photo_url: user.picture.large,
        })
    }

    async fn fetch_user(&self, gender: Option<&str>) -> Result<RandomUser, IdentityError> {
        let mut request = self.client.get(&self.base_url);
        if let Some(gender) = gender {
            request = request.query(&[("gender", gender)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::UnexpectedStatus(status));
        }

        let body = response.bytes().await?;
        let parsed: RandomUserResponse = serde_json::from_slice(&body)?;

        parsed
            .results
            .into_iter()
            .next()
            .ok_or(IdentityError::EmptyResults)
    }
}
