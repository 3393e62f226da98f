//! Newsletter and update subscribers.

use super::normalize::timestamp;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of the subscribe, update and newsletter endpoints.
#[derive(Deserialize, Validate, Clone, Debug, Default)]
#[serde(default)]
pub struct EmailRequest {
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub email: String,

    #[serde(
        default,
        deserialize_with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<String>,

    #[serde(
        default,
        deserialize_with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,

    /// Set on newsletter sign-ups.
    #[serde(
        default,
        deserialize_with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub subscribed_at: Option<String>,
}
