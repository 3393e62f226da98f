pub mod blob_store;
pub mod content_store;
pub mod kinds;
pub mod memory;
pub mod pipeline;
pub mod retry;
pub mod validator;
