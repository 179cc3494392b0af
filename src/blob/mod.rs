//! Blob storage for application attachments.
//!
//! Attachments are stored under keys of the form
//! `<stem>-<HH><MM>-<DD><MM><YY>_<record-id><extension>`; clients parse the
//! record id back out of the key, so the format is part of the external
//! contract.

pub mod local;
pub mod signed_url;

pub use local::LocalBlobStore;
pub use signed_url::{SignedUrl, SignedUrlGenerator};

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::{AppError, Result};

/// Response headers a read link should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHeaders {
    pub content_type: &'static str,
    pub disposition: &'static str,
}

impl ContentHeaders {
    /// Headers by file extension: PDFs as `application/pdf`, everything else as text.
    pub fn for_key(key: &str) -> Self {
        let content_type = if key.ends_with(".pdf") {
            "application/pdf"
        } else {
            "text/plain"
        };
        Self {
            content_type,
            disposition: "inline",
        }
    }
}

/// A time-limited read link.
#[derive(Debug, Clone, PartialEq)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Object storage for attached files.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove the object at `key`.
    fn delete(&self, key: &str) -> Result<()>;

    /// Mint a time-limited read link for `key`.
    fn presign(&self, key: &str, headers: &ContentHeaders) -> Result<PresignedUrl>;
}

/// Split a file name into stem and extension at the last dot.
///
/// The extension keeps its dot; a name without a dot has no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) => name.split_at(dot),
        None => (name, ""),
    }
}

/// Build the storage key for an uploaded file, avoiding keys in `taken`.
///
/// Only the final path component of `original_name` is used. A name whose
/// key is already taken gets a ` (2)`, ` (3)`, ... counter appended to its
/// stem, so files of one ingest never share a key.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use jobapps::blob::storage_key;
///
/// let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();
/// let first = storage_key("resume.pdf", "abc", at, &[]);
/// assert_eq!(first, "resume-0905-070324_abc.pdf");
/// assert_eq!(storage_key("resume.pdf", "abc", at, &[first]), "resume (2)-0905-070324_abc.pdf");
/// ```
pub fn storage_key(
    original_name: &str,
    record_id: &str,
    at: DateTime<Utc>,
    taken: &[String],
) -> String {
    let (stem, extension) = split_extension(base_name(original_name));
    let mut key = format_key(stem, extension, record_id, at);
    let mut n = 1;
    while taken.contains(&key) {
        n += 1;
        key = format_key(&format!("{} ({})", stem, n), extension, record_id, at);
    }
    key
}

/// Final path component of a client file name.
fn base_name(name: &str) -> &str {
    name.rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(name)
}

fn format_key(stem: &str, extension: &str, record_id: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}-{:02}{:02}-{:02}{:02}{:02}_{}{}",
        stem,
        at.hour(),
        at.minute(),
        at.day(),
        at.month(),
        at.year().rem_euclid(100),
        record_id,
        extension
    )
}

/// The record id embedded in a storage key, if any.
///
/// The id sits between the last `_` and the extension.
pub fn embedded_record_id(key: &str) -> Option<&str> {
    let sep = key.rfind('_')?;
    let tail = &key[sep + 1..];
    let (id, _) = split_extension(tail);
    Some(id)
}

/// Reject keys that could escape the bucket directory.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key == "."
        || key == ".."
        || key.contains('\0')
    {
        return Err(AppError::Validation(format!("invalid file key: {:?}", key)));
    }
    Ok(())
}
