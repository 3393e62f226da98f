//! Data models for the portfolio content service.
//!
//! Records live in the content store as JSON documents; the structs here
//! are the typed shapes used when presenting them back to clients.
//! They deserialize leniently (missing fields fall back to defaults) so
//! older documents still list cleanly.

pub mod experience;
pub mod media;
pub mod message;
pub mod normalize;
pub mod project;
pub mod subscriber;
pub mod upload;
pub mod vitae;
