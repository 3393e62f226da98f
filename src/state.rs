//! Shared handler state.

use crate::services::{
    blob_store::{BlobStore, DiskBlobStore},
    content_store::ContentStore,
    pipeline::{PipelinePolicy, UploadPipeline},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub content: Arc<dyn ContentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub pipeline: UploadPipeline,
    /// Set when blobs live on local disk and are served by `/blobs`.
    pub local_blobs: Option<DiskBlobStore>,
    /// Bearer token for admin routes; `None` leaves them open.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        content: Arc<dyn ContentStore>,
        blobs: Arc<dyn BlobStore>,
        policy: PipelinePolicy,
    ) -> Self {
        let pipeline = UploadPipeline::new(content.clone(), blobs.clone(), policy);
        Self {
            content,
            blobs,
            pipeline,
            local_blobs: None,
            admin_token: None,
        }
    }

    /// State backed by a disk blob store that is also served over HTTP.
    pub fn with_disk_blobs(
        content: Arc<dyn ContentStore>,
        disk: DiskBlobStore,
        policy: PipelinePolicy,
    ) -> Self {
        let mut state = Self::new(content, Arc::new(disk.clone()), policy);
        state.local_blobs = Some(disk);
        state
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.filter(|t| !t.is_empty()).map(Arc::from);
        self
    }
}
