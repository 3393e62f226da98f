//! Contact form messages.

use super::normalize::timestamp;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `POST /messages`. Every field is required.
#[derive(Serialize, Deserialize, Validate, Clone, Debug, Default)]
#[serde(default)]
pub struct NewMessage {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,

    #[validate(email(message = "email must be a valid address"))]
    pub email: String,

    #[validate(length(min = 1, message = "phone is required"))]
    pub phone: String,

    #[validate(length(min = 1, message = "interest is required"))]
    pub interest: String,

    #[validate(length(min = 1, message = "budget is required"))]
    pub budget: String,

    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,

    #[validate(length(min = 1, message = "message is required"))]
    pub message: String,
}

impl NewMessage {
    /// Trim every field in place.
    pub fn trimmed(mut self) -> Self {
        for field in [
            &mut self.name,
            &mut self.email,
            &mut self.phone,
            &mut self.interest,
            &mut self.budget,
            &mut self.country,
            &mut self.message,
        ] {
            *field = field.trim().to_string();
        }
        self
    }
}

/// A stored contact message as listed to the admin.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub interest: String,
    #[serde(default)]
    pub budget: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub message: String,
    #[serde(
        default,
        deserialize_with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<String>,
}
