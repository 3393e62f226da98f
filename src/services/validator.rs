//! Input checks run before any collaborator is contacted.

use crate::models::upload::{Submission, Upload};
use thiserror::Error;

/// Largest accepted video, in bytes.
pub const MAX_VIDEO_BYTES: usize = 100 * 1024 * 1024;

/// Largest accepted PDF, in bytes.
pub const MAX_PDF_BYTES: usize = 10 * 1024 * 1024;

pub const VIDEO_TYPES: [&str; 5] = [
    "video/mp4",
    "video/webm",
    "video/mov",
    "video/avi",
    "video/quicktime",
];

/// Software a project may list.
pub const SOFTWARE_CATALOG: [&str; 15] = [
    "Matlab",
    "AutoCAD",
    "Proteus",
    "PVsyst",
    "EasyEDA",
    "Fusion 360",
    "TRNSYS",
    "LTspice",
    "TopSolid",
    "SimulIDE",
    "FreeCAD",
    "TRNBuild",
    "RETScreen Expert",
    "Bitzer Software",
    "Arduino",
];

/// Why a submission was refused. The message is shown to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Rejected(pub String);

impl Rejected {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub fn validate_image(file: &Upload) -> Result<(), Rejected> {
    if !file.content_type.contains("image") {
        return Err(Rejected::new("Only image files are allowed"));
    }
    Ok(())
}

pub fn validate_video(file: &Upload) -> Result<(), Rejected> {
    if !VIDEO_TYPES.contains(&file.content_type.as_str()) {
        return Err(Rejected::new(
            "Unsupported video format: MP4, WebM, MOV or AVI only",
        ));
    }
    if file.size() > MAX_VIDEO_BYTES {
        return Err(Rejected::new("Video exceeds the 100 MB limit"));
    }
    Ok(())
}

pub fn validate_pdf(file: &Upload) -> Result<(), Rejected> {
    if file.content_type != "application/pdf" {
        return Err(Rejected::new("Only PDF files are allowed"));
    }
    if file.size() > MAX_PDF_BYTES {
        return Err(Rejected::new("PDF exceeds the 10 MB limit"));
    }
    Ok(())
}

/// Trimmed, non-empty value of `field`.
pub fn require_text<'a>(submission: &'a Submission, field: &str) -> Result<&'a str, Rejected> {
    submission
        .trimmed(field)
        .ok_or_else(|| Rejected(format!("{field} is required")))
}

/// Like [`require_text`], but an absent field is allowed. A field that is
/// present yet blank is still refused.
pub fn optional_required_text<'a>(
    submission: &'a Submission,
    field: &str,
) -> Result<Option<&'a str>, Rejected> {
    match submission.text(field) {
        None => Ok(None),
        Some(_) => require_text(submission, field).map(Some),
    }
}

/// Parse the JSON array of software names sent with a project.
///
/// Every entry must be in [`SOFTWARE_CATALOG`]; duplicates are dropped and
/// the first-seen order is kept.
pub fn parse_softwares(raw: &str) -> Result<Vec<String>, Rejected> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: Vec<String> = serde_json::from_str(raw)
        .map_err(|_| Rejected::new("softwares must be a JSON array of strings"))?;

    let mut softwares = Vec::with_capacity(parsed.len());
    for name in parsed {
        if !SOFTWARE_CATALOG.contains(&name.as_str()) {
            return Err(Rejected(format!("Unknown software `{name}`")));
        }
        if !softwares.contains(&name) {
            softwares.push(name);
        }
    }
    Ok(softwares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn file(content_type: &str, size: usize) -> Upload {
        Upload::new(Some("f".into()), content_type, Bytes::from(vec![0u8; size]))
    }

    #[test]
    fn images_only_need_an_image_mime_type() {
        assert!(validate_image(&file("image/png", 10)).is_ok());
        assert!(validate_image(&file("image/svg+xml", 10)).is_ok());
        assert!(validate_image(&file("application/pdf", 10)).is_err());
    }

    #[test]
    fn videos_are_checked_for_type_and_size() {
        assert!(validate_video(&file("video/quicktime", 10)).is_ok());
        assert!(validate_video(&file("video/x-matroska", 10)).is_err());
        assert!(validate_video(&file("video/mp4", MAX_VIDEO_BYTES)).is_ok());
        assert!(validate_video(&file("video/mp4", MAX_VIDEO_BYTES + 1)).is_err());
    }

    #[test]
    fn pdfs_are_checked_for_type_and_size() {
        assert!(validate_pdf(&file("application/pdf", MAX_PDF_BYTES)).is_ok());
        assert!(validate_pdf(&file("application/pdf", MAX_PDF_BYTES + 1)).is_err());
        assert!(validate_pdf(&file("application/x-pdf", 1)).is_err());
    }

    #[test]
    fn software_catalog_is_enforced() {
        assert_eq!(
            parse_softwares(r#"["Matlab","AutoCAD","Matlab"]"#).unwrap(),
            vec!["Matlab".to_string(), "AutoCAD".to_string()]
        );
        assert!(parse_softwares("").unwrap().is_empty());
        assert_eq!(
            parse_softwares(r#"["Matlab","Photoshop"]"#).unwrap_err(),
            Rejected::new("Unknown software `Photoshop`")
        );
        assert!(parse_softwares("Matlab").is_err());
        assert!(parse_softwares(r#"{"a":1}"#).is_err());
    }

    #[test]
    fn required_text_distinguishes_absent_from_blank() {
        let submission = Submission::default()
            .with_field("title", " Solar ")
            .with_field("name", "  ");
        assert_eq!(require_text(&submission, "title").unwrap(), "Solar");
        assert!(require_text(&submission, "subject").is_err());
        assert_eq!(optional_required_text(&submission, "subject").unwrap(), None);
        assert!(optional_required_text(&submission, "name").is_err());
    }
}
