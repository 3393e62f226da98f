//! Inbound form submissions.

use bytes::Bytes;
use std::collections::HashMap;

/// A file part received from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Filename as sent by the client, if any.
    pub file_name: Option<String>,

    /// MIME type declared for the part.
    pub content_type: String,

    /// Whole payload, buffered.
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(file_name: Option<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name,
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Extension taken from the client filename, lowercased.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name.as_deref()?;
        let (_, ext) = name.rsplit_once('.')?;
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Text fields plus an optional file from a create or update form.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub fields: HashMap<String, String>,
    pub file: Option<Upload>,
}

impl Submission {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Field value after trimming, `None` when absent or blank.
    pub fn trimmed(&self, name: &str) -> Option<&str> {
        self.text(name).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_file(mut self, file: Upload) -> Self {
        self.file = Some(file);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_comes_from_filename() {
        let upload = Upload::new(Some("Clip.MP4".into()), "video/mp4", Bytes::new());
        assert_eq!(upload.extension().as_deref(), Some("mp4"));

        let odd = Upload::new(Some("archive.tar/gz".into()), "application/gzip", Bytes::new());
        assert_eq!(odd.extension(), None);

        let unnamed = Upload::new(None, "image/png", Bytes::new());
        assert_eq!(unnamed.extension(), None);
    }

    #[test]
    fn trimmed_skips_blank_values() {
        let submission = Submission::default()
            .with_field("title", "  Intro  ")
            .with_field("description", "   ");
        assert_eq!(submission.trimmed("title"), Some("Intro"));
        assert_eq!(submission.trimmed("description"), None);
        assert_eq!(submission.trimmed("category"), None);
    }
}
