//! Local filesystem blob store.
//!
//! Objects live as plain files in `<root>/<bucket>/<key>`.

use std::fs;
use std::path::PathBuf;

use super::{validate_key, BlobStore, ContentHeaders, PresignedUrl, SignedUrlGenerator};
use crate::{AppError, Result};

/// Filesystem-backed bucket.
#[derive(Debug)]
pub struct LocalBlobStore {
    bucket: String,
    dir: PathBuf,
    signer: SignedUrlGenerator,
    public_url: String,
}

impl LocalBlobStore {
    /// Open (and create if needed) the bucket directory under `root`.
    pub fn open(
        root: PathBuf,
        bucket: &str,
        signer: SignedUrlGenerator,
        public_url: &str,
    ) -> Result<Self> {
        validate_key(bucket)
            .map_err(|_| AppError::Config(format!("invalid bucket name: {:?}", bucket)))?;

        let dir = root.join(bucket);
        fs::create_dir_all(&dir)?;
        tracing::debug!("Blob bucket {} at {:?}", bucket, dir);

        Ok(Self {
            bucket: bucket.to_string(),
            dir,
            signer,
            public_url: public_url.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }

    #[cfg(test)]
    pub(crate) fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.object_path(key)?.exists())
    }

    #[cfg(test)]
    pub(crate) fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("file {}", key))
            } else {
                AppError::Blob(format!("Failed to read {}: {}", key, e))
            }
        })
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;

        // Write to a sibling temp file first so readers never see a partial object
        let tmp = self.dir.join(format!(".{}.part", key));
        fs::write(&tmp, bytes)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| {
                let _ = fs::remove_file(&tmp);
                AppError::Blob(format!("Failed to upload {}: {}", key, e))
            })
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("file {}", key))
            } else {
                AppError::Blob(format!("Failed to delete {}: {}", key, e))
            }
        })
    }

    fn presign(&self, key: &str, headers: &ContentHeaders) -> Result<PresignedUrl> {
        validate_key(key)?;
        let signed = self.signer.generate(&self.bucket, key, headers);
        Ok(PresignedUrl {
            url: signed.to_url(&self.public_url),
            expires_at: signed.expires_at,
        })
    }
}
