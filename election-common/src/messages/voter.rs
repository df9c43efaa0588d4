use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postcode: String,
}

/// A registered voter, as written to the `voters` table and `voters_topic`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
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
}
