//! The four content kinds that carry a binary.
//!
//! Each kind states where its records and blobs live, which form field
//! holds the file, how that file is validated, and which text fields it
//! writes. The upload pipeline is generic over [`ContentKind`] and never
//! branches on a concrete kind.

use super::{
    blob_store::{ResourceType, StoredBlob, Transform, blob_id_from_url},
    content_store::{Document, Fields},
    pipeline::PipelinePolicy,
    validator::{
        Rejected, optional_required_text, parse_softwares, require_text, validate_image,
        validate_pdf, validate_video,
    },
};
use crate::models::{
    experience::Experience, media::DEFAULT_CATEGORY, media::Media, project::Project,
    upload::Submission, upload::Upload, vitae::Vitae,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    /// Absent fields keep their stored values.
    Update,
}

pub trait ContentKind: Send + Sync + 'static {
    /// Typed shape used when presenting records.
    type Record: Serialize + DeserializeOwned;

    /// Collection in the content store; also the blob folder.
    const COLLECTION: &'static str;
    /// Singular name used in client-facing messages.
    const LABEL: &'static str;
    /// Multipart field carrying the file.
    const FILE_FIELD: &'static str;
    /// Record field holding the blob URL.
    const URL_FIELD: &'static str;
    /// Field that must be unique within the collection.
    const UNIQUE_FIELD: Option<&'static str> = None;
    const FILE_REQUIRED: bool = false;
    /// Whether records carry `createdAt`/`updatedAt`.
    const TIMESTAMPED: bool = true;

    fn transform() -> Transform;

    fn validate_file(file: &Upload) -> Result<(), Rejected>;

    /// Text fields written for a submission.
    fn fields(submission: &Submission, mode: Mode) -> Result<Fields, Rejected>;

    fn upload_timeout(policy: &PipelinePolicy) -> Duration {
        policy.upload_timeout
    }

    /// Fields recorded from a completed upload.
    fn blob_fields(blob: &StoredBlob) -> Fields {
        let mut fields = Fields::new();
        fields.insert(Self::URL_FIELD.into(), json!(blob.url));
        fields.insert("publicId".into(), json!(blob.id));
        fields
    }

    /// Identifier of the blob a stored record points at, recovered from its
    /// URL when the record predates stored identifiers.
    fn blob_id(doc: &Document) -> Option<String> {
        doc.str_field("publicId").map(str::to_string).or_else(|| {
            doc.str_field(Self::URL_FIELD)
                .and_then(|url| blob_id_from_url(url, Self::COLLECTION))
        })
    }

    /// Normalized client view of a stored record.
    fn present(doc: Document) -> Value {
        let raw = doc.into_json();
        match serde_json::from_value::<Self::Record>(raw.clone()).and_then(serde_json::to_value) {
            Ok(value) => value,
            Err(err) => {
                warn!(collection = Self::COLLECTION, error = %err, "record does not match its model");
                raw
            }
        }
    }
}

fn image_transform() -> Transform {
    Transform {
        resource: ResourceType::Image,
        quality: Some("auto:good"),
        width: Some(1200),
        crop: Some("scale"),
        ..Transform::raw()
    }
}

/// Insert `field` when the value is known.
fn put_text(fields: &mut Fields, field: &str, value: Option<&str>) {
    if let Some(value) = value {
        fields.insert(field.into(), json!(value));
    }
}

pub struct ProjectKind;

impl ContentKind for ProjectKind {
    type Record = Project;

    const COLLECTION: &'static str = "projects";
    const LABEL: &'static str = "project";
    const FILE_FIELD: &'static str = "image";
    const URL_FIELD: &'static str = "image";

    fn transform() -> Transform {
        image_transform()
    }

    fn validate_file(file: &Upload) -> Result<(), Rejected> {
        validate_image(file)
    }

    fn fields(submission: &Submission, mode: Mode) -> Result<Fields, Rejected> {
        let mut fields = Fields::new();
        match mode {
            Mode::Create => {
                put_text(&mut fields, "title", Some(require_text(submission, "title")?));
                put_text(
                    &mut fields,
                    "description",
                    Some(require_text(submission, "description")?),
                );
                let softwares = submission
                    .text("softwares")
                    .map(parse_softwares)
                    .transpose()?
                    .unwrap_or_default();
                fields.insert("softwares".into(), json!(softwares));
            }
            Mode::Update => {
                put_text(&mut fields, "title", optional_required_text(submission, "title")?);
                put_text(
                    &mut fields,
                    "description",
                    optional_required_text(submission, "description")?,
                );
                if let Some(raw) = submission.text("softwares") {
                    fields.insert("softwares".into(), json!(parse_softwares(raw)?));
                }
            }
        }
        Ok(fields)
    }
}

pub struct ExperienceKind;

impl ContentKind for ExperienceKind {
    type Record = Experience;

    const COLLECTION: &'static str = "experiences";
    const LABEL: &'static str = "experience";
    const FILE_FIELD: &'static str = "image";
    const URL_FIELD: &'static str = "image";
    const FILE_REQUIRED: bool = true;
    const TIMESTAMPED: bool = false;

    fn transform() -> Transform {
        image_transform()
    }

    fn validate_file(file: &Upload) -> Result<(), Rejected> {
        validate_image(file)
    }

    fn fields(submission: &Submission, mode: Mode) -> Result<Fields, Rejected> {
        let mut fields = Fields::new();
        match mode {
            Mode::Create => {
                put_text(&mut fields, "name", Some(require_text(submission, "name")?));
                put_text(&mut fields, "subject", Some(require_text(submission, "subject")?));
                fields.insert(
                    "verified".into(),
                    json!(submission.text("verified") == Some("true")),
                );
            }
            Mode::Update => {
                put_text(&mut fields, "name", optional_required_text(submission, "name")?);
                put_text(
                    &mut fields,
                    "subject",
                    optional_required_text(submission, "subject")?,
                );
                if let Some(verified) = submission.text("verified") {
                    fields.insert("verified".into(), json!(verified == "true"));
                }
            }
        }
        Ok(fields)
    }
}

pub struct MediaKind;

impl ContentKind for MediaKind {
    type Record = Media;

    const COLLECTION: &'static str = "media";
    const LABEL: &'static str = "video";
    const FILE_FIELD: &'static str = "src";
    const URL_FIELD: &'static str = "src";
    const UNIQUE_FIELD: Option<&'static str> = Some("title");
    const FILE_REQUIRED: bool = true;

    fn transform() -> Transform {
        Transform {
            resource: ResourceType::Video,
            quality: Some("auto:low"),
            width: Some(854),
            height: Some(480),
            crop: Some("limit"),
            format: Some("mp4"),
            video_codec: Some("h264"),
            audio_codec: Some("aac"),
        }
    }

    fn validate_file(file: &Upload) -> Result<(), Rejected> {
        validate_video(file)
    }

    fn upload_timeout(policy: &PipelinePolicy) -> Duration {
        policy.video_upload_timeout
    }

    fn fields(submission: &Submission, mode: Mode) -> Result<Fields, Rejected> {
        let mut fields = Fields::new();
        // Title is required on update as well.
        put_text(&mut fields, "title", Some(require_text(submission, "title")?));

        let description = submission.text("description").map(str::trim);
        let category = submission
            .text("category")
            .map(|c| Some(c.trim()).filter(|c| !c.is_empty()).unwrap_or(DEFAULT_CATEGORY));
        match mode {
            Mode::Create => {
                put_text(&mut fields, "description", Some(description.unwrap_or("")));
                put_text(&mut fields, "category", Some(category.unwrap_or(DEFAULT_CATEGORY)));
                fields.insert("views".into(), json!(0));
            }
            Mode::Update => {
                put_text(&mut fields, "description", description);
                put_text(&mut fields, "category", category);
            }
        }
        Ok(fields)
    }

    fn blob_fields(blob: &StoredBlob) -> Fields {
        let meta = &blob.meta;
        let mut fields = Fields::new();
        fields.insert("src".into(), json!(blob.url));
        fields.insert("publicId".into(), json!(blob.id));
        fields.insert("duration".into(), json!(meta.duration.unwrap_or(0.0)));
        fields.insert("width".into(), json!(meta.width.unwrap_or(0)));
        fields.insert("height".into(), json!(meta.height.unwrap_or(0)));
        fields.insert(
            "format".into(),
            json!(meta.format.clone().unwrap_or_else(|| "mp4".into())),
        );
        fields.insert("fileSize".into(), json!(meta.bytes));
        fields
    }
}

pub struct VitaeKind;

impl ContentKind for VitaeKind {
    type Record = Vitae;

    const COLLECTION: &'static str = "vitae";
    const LABEL: &'static str = "CV";
    const FILE_FIELD: &'static str = "file";
    const URL_FIELD: &'static str = "file";
    const UNIQUE_FIELD: Option<&'static str> = Some("name");
    const FILE_REQUIRED: bool = true;

    fn transform() -> Transform {
        Transform::raw()
    }

    fn validate_file(file: &Upload) -> Result<(), Rejected> {
        validate_pdf(file)
    }

    fn fields(submission: &Submission, _mode: Mode) -> Result<Fields, Rejected> {
        let mut fields = Fields::new();
        put_text(&mut fields, "name", Some(require_text(submission, "name")?));
        Ok(fields)
    }
}
