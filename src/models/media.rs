//! A video in the media library.
//!
//! Everything describing the file itself (`duration`, `width`, `height`,
//! `format`, `file_size`) is taken from the blob store after upload and is
//! never accepted from the client.

use super::normalize::{or_default, timestamp};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(default)]
    pub id: String,

    /// Unique among media records, exact match.
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Public URL of the video.
    #[serde(default)]
    pub src: String,

    #[serde(default = "default_category", deserialize_with = "category")]
    pub category: String,

    /// Length in seconds.
    #[serde(default, deserialize_with = "or_default")]
    pub duration: f64,

    #[serde(default, deserialize_with = "or_default")]
    pub views: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Stored size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

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

pub const DEFAULT_CATEGORY: &str = "general";

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn category<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(value
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(default_category))
}
