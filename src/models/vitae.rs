//! A downloadable CV (PDF).

use super::normalize::{or_default, timestamp};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vitae {
    #[serde(default)]
    pub id: String,

    /// Unique among CVs.
    #[serde(default, deserialize_with = "or_default")]
    pub name: String,

    /// Public URL of the PDF.
    #[serde(default, deserialize_with = "or_default")]
    pub file: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,

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
}
