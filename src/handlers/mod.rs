pub mod blob_handlers;
pub mod content_handlers;
pub mod health_handlers;
pub mod message_handlers;
