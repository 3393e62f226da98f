//! BlobStore: binary hosting for images, videos and PDFs.
//!
//! `DiskBlobStore` keeps payloads on local disk sharded beneath
//! `base_path/{folder}/{shard}/{stem}.{ext}` and serves them back under
//! `{public_url}/blobs/{folder}/{stem}.{ext}`. A blob's identifier is
//! `{folder}/{stem}`, the same shape hosted media services use, so records
//! written against either kind of store stay interchangeable.

use crate::models::upload::Upload;
use async_trait::async_trait;
use md5::Context;
use serde::Serialize;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("invalid blob identifier `{0}`")]
    InvalidId(String),
    #[error("upload rejected by blob store: {0}")]
    Rejected(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobResult<T> = Result<T, BlobError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Video,
    Raw,
}

/// Delivery transformation requested for an upload.
///
/// Hosted providers apply it at upload time; the disk store records it and
/// keeps the original bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transform {
    pub resource: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<&'static str>,
}

impl Transform {
    pub fn raw() -> Self {
        Self {
            resource: ResourceType::Raw,
            quality: None,
            width: None,
            height: None,
            crop: None,
            format: None,
            video_codec: None,
            audio_codec: None,
        }
    }
}

/// Properties of a stored blob derived by the store, not the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlobMeta {
    pub bytes: u64,
    pub format: Option<String>,
    pub etag: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Seconds, for audio/video.
    pub duration: Option<f64>,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    /// Permanent public URL.
    pub url: String,
    /// Identifier used for later deletion.
    pub id: String,
    pub meta: BlobMeta,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `upload` under `folder` and return where it lives.
    async fn upload(
        &self,
        upload: &Upload,
        folder: &str,
        transform: &Transform,
    ) -> BlobResult<StoredBlob>;

    /// Remove a blob by identifier.
    async fn delete(&self, id: &str) -> BlobResult<()>;

    /// Cheap write/read/delete probe for readiness checks.
    async fn ping(&self) -> BlobResult<()>;
}

/// Derive a blob identifier from its public URL.
///
/// Used for records written before identifiers were stored. Takes the last
/// path segment, drops any `,`-separated transformation suffix and the
/// extension, and prefixes the kind's folder.
pub fn blob_id_from_url(url: &str, folder: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    let clean = last.split(',').next()?;
    let stem = clean.split('.').next()?;
    if stem.is_empty() || stem.contains(':') {
        return None;
    }
    Some(format!("{folder}/{stem}"))
}

/// File extension for an upload: client filename first, then the MIME type.
fn extension_for(upload: &Upload) -> String {
    if let Some(ext) = upload.extension() {
        return ext;
    }
    mime_guess::get_mime_extensions_str(&upload.content_type)
        .and_then(|exts| {
            // Prefer the conventional spelling when the table lists several.
            exts.iter()
                .find(|e| matches!(**e, "jpg" | "mp4" | "mov" | "pdf" | "png" | "webm"))
                .or_else(|| exts.first())
        })
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| "bin".into())
}

#[derive(Clone, Debug)]
pub struct DiskBlobStore {
    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,

    /// Origin under which `/blobs/...` is reachable.
    public_url: String,
}

impl DiskBlobStore {
    pub fn new(base_path: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Reject path segments that could escape the folder layout.
    fn ensure_segment_safe(segment: &str) -> BlobResult<()> {
        if segment.is_empty()
            || segment.len() > 255
            || segment.starts_with('.')
            || segment.contains("..")
            || segment
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
        {
            return Err(BlobError::InvalidId(segment.to_string()));
        }
        Ok(())
    }

    fn split_id(id: &str) -> BlobResult<(&str, &str)> {
        let (folder, stem) = id
            .rsplit_once('/')
            .ok_or_else(|| BlobError::InvalidId(id.to_string()))?;
        Self::ensure_segment_safe(folder)?;
        Self::ensure_segment_safe(stem)?;
        Ok((folder, stem))
    }

    /// Shard directory name: the first two characters of the stem.
    fn shard(stem: &str) -> &str {
        let end = stem.char_indices().nth(2).map_or(stem.len(), |(i, _)| i);
        &stem[..end]
    }

    fn folder_root(&self, folder: &str) -> PathBuf {
        self.base_path.join(folder)
    }

    fn shard_dir(&self, folder: &str, stem: &str) -> PathBuf {
        self.folder_root(folder).join(Self::shard(stem))
    }

    /// Find the stored file for `{folder}/{stem}` regardless of extension.
    async fn locate(&self, folder: &str, stem: &str) -> BlobResult<Option<PathBuf>> {
        let dir = self.shard_dir(folder, stem);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Open a stored blob for streaming by its public `{folder}/{file}` path.
    ///
    /// Returns the open file, its length and a guessed content type.
    pub async fn open(&self, folder: &str, file_name: &str) -> BlobResult<(File, u64, String)> {
        Self::ensure_segment_safe(folder)?;
        Self::ensure_segment_safe(file_name)?;
        let stem = file_name.split('.').next().unwrap_or(file_name);
        let path = self.shard_dir(folder, stem).join(file_name);

        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                BlobError::NotFound(format!("{folder}/{file_name}"))
            } else {
                BlobError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        let content_type = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .to_string();
        Ok((file, len, content_type))
    }

    /// Recursively remove empty directories up to `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    /// Writes to a temporary file, fsyncs, then renames into place so a
    /// half-written payload is never visible under its final name.
    async fn upload(
        &self,
        upload: &Upload,
        folder: &str,
        transform: &Transform,
    ) -> BlobResult<StoredBlob> {
        Self::ensure_segment_safe(folder)?;
        let stem = Uuid::new_v4().simple().to_string();
        let ext = extension_for(upload);
        let file_name = format!("{stem}.{ext}");

        let dir = self.shard_dir(folder, &stem);
        fs::create_dir_all(&dir).await?;
        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let file_path = dir.join(&file_name);

        let mut file = File::create(&tmp_path).await?;
        let mut digest = Context::new();
        digest.consume(&upload.bytes);

        if let Err(err) = file.write_all(&upload.bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }

        debug!(
            folder,
            file = %file_name,
            bytes = upload.size(),
            transform = ?transform,
            "stored blob on disk"
        );

        Ok(StoredBlob {
            url: format!("{}/blobs/{}/{}", self.public_url, folder, file_name),
            id: format!("{folder}/{stem}"),
            meta: BlobMeta {
                bytes: upload.size() as u64,
                format: Some(ext),
                etag: Some(format!("{:x}", digest.compute())),
                ..BlobMeta::default()
            },
        })
    }

    async fn delete(&self, id: &str) -> BlobResult<()> {
        let (folder, stem) = Self::split_id(id)?;
        let path = self
            .locate(folder, stem)
            .await?
            .ok_or_else(|| BlobError::NotFound(id.to_string()))?;

        fs::remove_file(&path).await?;
        debug!("removed blob file {}", path.display());

        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent, &self.folder_root(folder)).await;
        }
        Ok(())
    }

    async fn ping(&self) -> BlobResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read? == b"readyz" {
            Ok(())
        } else {
            Err(BlobError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "probe file content mismatch",
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn png() -> Upload {
        Upload::new(
            Some("logo.png".into()),
            "image/png",
            Bytes::from_static(b"\x89PNG fake"),
        )
    }

    #[test]
    fn blob_ids_are_recovered_from_urls() {
        assert_eq!(
            blob_id_from_url(
                "https://res.example.com/demo/image/upload/v17/projects/abc123.jpg",
                "projects"
            )
            .as_deref(),
            Some("projects/abc123")
        );
        assert_eq!(
            blob_id_from_url("https://cdn.example.com/raw/cv_2024.pdf,fl_attachment", "vitae")
                .as_deref(),
            Some("vitae/cv_2024")
        );
        assert_eq!(
            blob_id_from_url("http://localhost:3000/blobs/media/ff00.mp4?dl=1", "media")
                .as_deref(),
            Some("media/ff00")
        );
        assert_eq!(blob_id_from_url("", "media"), None);
    }

    #[test]
    fn extension_falls_back_to_mime_type() {
        let unnamed = Upload::new(None, "application/pdf", Bytes::new());
        assert_eq!(extension_for(&unnamed), "pdf");
        let unknown = Upload::new(None, "application/x-nothing-known", Bytes::new());
        assert_eq!(extension_for(&unknown), "bin");
    }

    #[tokio::test]
    async fn upload_open_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::new(dir.path(), "http://localhost:3000/");

        let blob = store
            .upload(&png(), "experiences", &Transform::raw())
            .await
            .unwrap();
        assert!(blob.id.starts_with("experiences/"));
        assert!(blob.url.starts_with("http://localhost:3000/blobs/experiences/"));
        assert!(blob.url.ends_with(".png"));
        assert_eq!(blob.meta.bytes, 9);
        assert_eq!(blob.meta.format.as_deref(), Some("png"));
        assert_eq!(
            blob_id_from_url(&blob.url, "experiences").as_deref(),
            Some(blob.id.as_str())
        );

        let file_name = blob.url.rsplit('/').next().unwrap();
        let (_, len, content_type) = store.open("experiences", file_name).await.unwrap();
        assert_eq!(len, 9);
        assert_eq!(content_type, "image/png");

        store.delete(&blob.id).await.unwrap();
        assert!(matches!(
            store.open("experiences", file_name).await,
            Err(BlobError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(&blob.id).await,
            Err(BlobError::NotFound(_))
        ));
        // Shard directory was pruned, the folder root stays.
        assert!(dir.path().join("experiences").exists());
        assert!(
            !dir.path()
                .join("experiences")
                .join(DiskBlobStore::shard(blob.id.rsplit('/').next().unwrap()))
                .exists()
        );
    }

    #[tokio::test]
    async fn traversal_attempts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::new(dir.path(), "http://localhost");
        assert!(matches!(
            store.open("..", "passwd").await,
            Err(BlobError::InvalidId(_))
        ));
        assert!(matches!(
            store.delete("media/../../etc").await,
            Err(BlobError::InvalidId(_))
        ));
        assert!(matches!(
            store.delete("no-folder").await,
            Err(BlobError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn ping_probes_the_base_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::new(dir.path().join("nested"), "http://localhost");
        store.ping().await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path().join("nested")).unwrap().count(), 0);
    }
}
