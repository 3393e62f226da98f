//! UploadPipeline: validate, upload, check uniqueness, persist, and clean
//! up after failures.
//!
//! Ordering rules:
//! - validation runs before any collaborator call;
//! - the content store is written only after the upload and the uniqueness
//!   check have both resolved (they run concurrently);
//! - a blob uploaded during a submission that then fails is deleted again;
//! - a replaced blob is deleted only after the record points at its
//!   successor;
//! - a deleted record's blob goes only once the record itself is gone.
//!
//! Cleanup is best-effort: a failed compensating delete is logged and never
//! replaces the error the caller gets.

use super::{
    blob_store::{BlobError, BlobStore, StoredBlob},
    content_store::{ContentStore, Document, Fields, StoreError},
    kinds::{ContentKind, Mode},
    retry::{OpError, RetryPolicy, with_retry, with_timeout},
    validator::Rejected,
};
use crate::models::{normalize, upload::Submission, upload::Upload};
use serde_json::{Value, json};
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Timeouts and retry policy for collaborator calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePolicy {
    /// Image and PDF uploads.
    pub upload_timeout: Duration,
    pub video_upload_timeout: Duration,
    /// Point lookups and list reads.
    pub read_timeout: Duration,
    /// Inserts, updates and record deletes.
    pub write_timeout: Duration,
    /// Uniqueness lookups; exhausting it counts as "no conflict".
    pub uniqueness: RetryPolicy,
    pub blob_delete_timeout: Duration,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            upload_timeout: Duration::from_secs(60),
            video_upload_timeout: Duration::from_secs(300),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            uniqueness: RetryPolicy {
                attempts: 3,
                timeout: Duration::from_secs(30),
                delay: Duration::from_secs(2),
            },
            blob_delete_timeout: Duration::from_secs(15),
        }
    }
}

/// Classified failure of a pipeline operation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{operation} timed out after {after:?}")]
    UpstreamTimeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("{operation} failed: {detail}")]
    UpstreamFailure {
        operation: &'static str,
        detail: String,
    },
}

impl From<Rejected> for PipelineError {
    fn from(rejected: Rejected) -> Self {
        Self::Validation(rejected.0)
    }
}

impl PipelineError {
    fn upstream<E: fmt::Display>(operation: &'static str, err: OpError<E>) -> Self {
        match err {
            OpError::TimedOut(after) => Self::UpstreamTimeout { operation, after },
            OpError::Failed(err) => Self::UpstreamFailure {
                operation,
                detail: err.to_string(),
            },
        }
    }
}

/// A compensating or replaced-blob delete that did not go through.
#[derive(Debug, Error)]
#[error("could not delete blob `{id}`: {reason}")]
pub struct CleanupFailed {
    pub id: String,
    pub reason: String,
}

#[derive(Clone)]
pub struct UploadPipeline {
    content: Arc<dyn ContentStore>,
    blobs: Arc<dyn BlobStore>,
    policy: PipelinePolicy,
}

impl UploadPipeline {
    pub fn new(
        content: Arc<dyn ContentStore>,
        blobs: Arc<dyn BlobStore>,
        policy: PipelinePolicy,
    ) -> Self {
        Self {
            content,
            blobs,
            policy,
        }
    }

    pub fn policy(&self) -> &PipelinePolicy {
        &self.policy
    }

    /// All records of kind `K`, re-read from the store.
    pub async fn list<K: ContentKind>(&self) -> Result<Vec<Document>, PipelineError> {
        with_timeout(self.policy.read_timeout, self.content.list(K::COLLECTION))
            .await
            .map_err(|err| PipelineError::upstream("list records", err))
    }

    pub async fn create<K: ContentKind>(
        &self,
        submission: Submission,
    ) -> Result<Document, PipelineError> {
        let mut fields = K::fields(&submission, Mode::Create)?;
        match submission.file.as_ref() {
            Some(file) => K::validate_file(file)?,
            None if K::FILE_REQUIRED => {
                return Err(PipelineError::Validation(format!(
                    "{} file is required",
                    K::LABEL
                )));
            }
            None => {}
        }

        let key = unique_key::<K>(&fields);
        let (uploaded, taken) = tokio::join!(
            self.upload::<K>(submission.file.as_ref()),
            self.key_taken::<K>(key.as_ref(), None),
        );

        if taken {
            if let Ok(Some(blob)) = &uploaded {
                self.release(&blob.id, "duplicate key").await;
            }
            return Err(conflict::<K>());
        }
        let blob = uploaded?;

        if let Some(blob) = &blob {
            fields.extend(K::blob_fields(blob));
        }
        if K::TIMESTAMPED {
            let now = normalize::now();
            fields.insert("createdAt".into(), json!(now));
            fields.insert("updatedAt".into(), json!(now));
        }

        let inserted = with_timeout(
            self.policy.write_timeout,
            self.content.insert(K::COLLECTION, fields.clone()),
        )
        .await;
        match inserted {
            Ok(id) => {
                info!(collection = K::COLLECTION, id = %id, "record created");
                Ok(Document::new(id, fields))
            }
            Err(err) => {
                if let Some(blob) = &blob {
                    self.release(&blob.id, "insert failed").await;
                }
                Err(PipelineError::upstream("save record", err))
            }
        }
    }

    /// Apply `submission` to record `id`. Without a new file the stored
    /// blob reference is left untouched.
    pub async fn update<K: ContentKind>(
        &self,
        id: &str,
        submission: Submission,
    ) -> Result<Document, PipelineError> {
        let id = require_id(id)?;
        let mut patch = K::fields(&submission, Mode::Update)?;
        if let Some(file) = submission.file.as_ref() {
            K::validate_file(file)?;
        }

        let existing = self.fetch::<K>(id).await?;

        let key = unique_key::<K>(&patch);
        let (uploaded, taken) = tokio::join!(
            self.upload::<K>(submission.file.as_ref()),
            self.key_taken::<K>(key.as_ref(), Some(id)),
        );

        if taken {
            if let Ok(Some(blob)) = &uploaded {
                self.release(&blob.id, "duplicate key").await;
            }
            return Err(conflict::<K>());
        }
        let blob = uploaded?;

        if let Some(blob) = &blob {
            patch.extend(K::blob_fields(blob));
        }
        if K::TIMESTAMPED {
            patch.insert("updatedAt".into(), json!(normalize::now()));
        }

        let updated = with_timeout(
            self.policy.write_timeout,
            self.content.update(K::COLLECTION, id, patch.clone()),
        )
        .await;
        if let Err(err) = updated {
            if let Some(blob) = &blob {
                self.release(&blob.id, "update failed").await;
            }
            return Err(match err {
                OpError::Failed(StoreError::NotFound { .. }) => not_found::<K>(id),
                other => PipelineError::upstream("save record", other),
            });
        }

        // The record now points at the new blob; the old one can go.
        if blob.is_some() {
            if let Some(previous) = K::blob_id(&existing) {
                self.release(&previous, "replaced").await;
            }
        }

        info!(collection = K::COLLECTION, id, "record updated");
        let mut fields = existing.fields;
        fields.extend(patch);
        Ok(Document::new(id, fields))
    }

    /// Remove record `id` and its blob. The two deletions are independent:
    /// a blob that cannot be removed does not keep the record alive.
    pub async fn delete<K: ContentKind>(&self, id: &str) -> Result<(), PipelineError> {
        let id = require_id(id)?;
        let existing = self.fetch::<K>(id).await?;
        let blob_id = K::blob_id(&existing);

        match with_timeout(
            self.policy.write_timeout,
            self.content.delete(K::COLLECTION, id),
        )
        .await
        {
            Ok(()) => info!(collection = K::COLLECTION, id, "record deleted"),
            Err(OpError::Failed(StoreError::NotFound { .. })) => return Err(not_found::<K>(id)),
            Err(err) => return Err(PipelineError::upstream("delete record", err)),
        }

        if let Some(blob_id) = blob_id {
            if let Err(err) = self.discard_blob(&blob_id).await {
                warn!(collection = K::COLLECTION, id, error = %err, "blob left behind after record delete");
            }
        }
        Ok(())
    }

    async fn fetch<K: ContentKind>(&self, id: &str) -> Result<Document, PipelineError> {
        match with_timeout(self.policy.read_timeout, self.content.get(K::COLLECTION, id)).await {
            Ok(doc) => Ok(doc),
            Err(OpError::Failed(StoreError::NotFound { .. })) => Err(not_found::<K>(id)),
            Err(err) => Err(PipelineError::upstream("load record", err)),
        }
    }

    async fn upload<K: ContentKind>(
        &self,
        file: Option<&Upload>,
    ) -> Result<Option<StoredBlob>, PipelineError> {
        let Some(file) = file else {
            return Ok(None);
        };
        let transform = K::transform();
        debug!(
            folder = K::COLLECTION,
            bytes = file.size(),
            content_type = %file.content_type,
            "uploading blob"
        );
        with_timeout(
            K::upload_timeout(&self.policy),
            self.blobs.upload(file, K::COLLECTION, &transform),
        )
        .await
        .map(Some)
        .map_err(|err| PipelineError::upstream("upload file", err))
    }

    /// Whether another record already holds `key`. Fails open: when the
    /// lookup cannot complete the write is allowed.
    async fn key_taken<K: ContentKind>(
        &self,
        key: Option<&(&'static str, Value)>,
        exclude: Option<&str>,
    ) -> bool {
        let Some((field, value)) = key else {
            return false;
        };
        let lookup = with_retry(&self.policy.uniqueness, "uniqueness check", || {
            self.content.query_by_field(K::COLLECTION, field, value)
        })
        .await;

        match lookup {
            Ok(matches) => matches.iter().any(|doc| Some(doc.id.as_str()) != exclude),
            Err(err) => {
                warn!(
                    collection = K::COLLECTION,
                    field = *field,
                    error = %err,
                    "uniqueness check unavailable, allowing write"
                );
                false
            }
        }
    }

    /// Delete a blob under the delete timeout, reporting rather than
    /// logging the outcome.
    pub async fn discard_blob(&self, id: &str) -> Result<(), CleanupFailed> {
        match with_timeout(self.policy.blob_delete_timeout, self.blobs.delete(id)).await {
            Ok(()) => {
                debug!(blob_id = id, "blob deleted");
                Ok(())
            }
            Err(OpError::Failed(BlobError::NotFound(_))) => {
                debug!(blob_id = id, "blob already gone");
                Ok(())
            }
            Err(err) => Err(CleanupFailed {
                id: id.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    async fn release(&self, id: &str, reason: &'static str) {
        if let Err(err) = self.discard_blob(id).await {
            warn!(blob_id = id, reason, error = %err, "blob cleanup failed, blob leaked");
        }
    }
}

fn unique_key<K: ContentKind>(fields: &Fields) -> Option<(&'static str, Value)> {
    let field = K::UNIQUE_FIELD?;
    fields.get(field).map(|value| (field, value.clone()))
}

fn require_id(id: &str) -> Result<&str, PipelineError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(PipelineError::Validation("id is required".into()));
    }
    Ok(id)
}

fn conflict<K: ContentKind>() -> PipelineError {
    PipelineError::Conflict(format!(
        "A {} with this {} already exists",
        K::LABEL,
        K::UNIQUE_FIELD.unwrap_or("key")
    ))
}

fn not_found<K: ContentKind>(id: &str) -> PipelineError {
    PipelineError::NotFound(format!("{} `{}` not found", K::LABEL, id))
}
