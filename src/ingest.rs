//! Ingest coordinator - uploads attachments, then persists the record.
//!
//! An ingest walks `Uploading -> Persisting -> Committed`. It ends in one of
//! three failure states instead when something goes wrong:
//!
//! - `UploadFailed`: a file could not be stored. Remaining files are
//!   skipped and no record is written. Files uploaded before the failure stay
//!   in the blob store and are listed in the error.
//! - `PersistFailedCompensated`: the record insert failed and no uploaded
//!   file is left in the blob store ([`AppError::PersistFailed`]). A file
//!   that is already gone when compensation runs counts as removed.
//! - `PersistFailedUncompensated`: the record insert failed and at least one
//!   file could not be deleted ([`AppError::OrphanedBlobs`]).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::blob::{storage_key, BlobStore};
use crate::db::RecordStore;
use crate::record::{ApplicationFields, ApplicationRecord};
use crate::{AppError, Result};

/// A file attached to an ingest request.
#[derive(Debug, Clone)]
pub struct SubmittedFile {
    /// Client-side file name, used for the storage key
    pub name: String,
    pub content: Vec<u8>,
}

impl SubmittedFile {
    pub fn from_bytes(name: &str, content: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            content,
        }
    }
}

/// Progress of a single ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Uploading,
    Persisting,
    Committed,
    UploadFailed,
    PersistFailedCompensated,
    PersistFailedUncompensated,
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestState::Uploading => "uploading",
            IngestState::Persisting => "persisting",
            IngestState::Committed => "committed",
            IngestState::UploadFailed => "upload_failed",
            IngestState::PersistFailedCompensated => "persist_failed_compensated",
            IngestState::PersistFailedUncompensated => "persist_failed_uncompensated",
        };
        f.write_str(name)
    }
}

/// Result of a committed ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReceipt {
    pub application: ApplicationRecord,
    pub num_files: usize,
}

/// Coordinates the blob upload and record insert of one application.
pub struct IngestCoordinator {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    clock: fn() -> DateTime<Utc>,
}

impl IngestCoordinator {
    pub fn new(records: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            records,
            blobs,
            clock: Utc::now,
        }
    }

    /// Use a fixed clock for storage key timestamps.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Store `files` and then a new record for `fields`.
    pub fn ingest(
        &self,
        fields: ApplicationFields,
        files: Vec<SubmittedFile>,
    ) -> Result<IngestReceipt> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut record = ApplicationRecord::new(id, fields, files.len());
        let num_files = files.len();

        let mut state = IngestState::Uploading;
        tracing::debug!("Ingest {} {}: {} files", record.id, state, num_files);

        let now = (self.clock)();
        let mut uploaded: Vec<String> = Vec::with_capacity(num_files);
        for (i, file) in files.iter().enumerate() {
            let key = storage_key(&file.name, &record.id, now, &uploaded);

            if let Err(e) = self.blobs.put(&key, &file.content) {
                let reason = e.to_string();
                state = IngestState::UploadFailed;
                tracing::warn!(
                    "Ingest {} {}: {} ({} earlier uploads left in place)",
                    record.id,
                    state,
                    reason,
                    uploaded.len()
                );
                return Err(AppError::UploadFailed {
                    file: file.name.clone(),
                    uploaded,
                    reason,
                });
            }

            record.files[i] = key.clone();
            uploaded.push(key);
        }

        state = IngestState::Persisting;
        tracing::debug!("Ingest {} {}", record.id, state);

        if let Err(err) = self.records.insert(&record) {
            return Err(self.compensate(&record.id, uploaded, err));
        }

        state = IngestState::Committed;
        tracing::info!("Ingest {} {} with {} files", record.id, state, num_files);

        Ok(IngestReceipt {
            application: record,
            num_files,
        })
    }

    /// Delete uploaded files after a failed insert.
    ///
    /// A key the blob store no longer has counts as removed.
    fn compensate(&self, id: &str, uploaded: Vec<String>, cause: AppError) -> AppError {
        tracing::warn!(
            "Ingest {}: failed to store application, removing {} uploaded files: {}",
            id,
            uploaded.len(),
            cause
        );

        let cleaned = uploaded.len();
        let mut orphaned = Vec::new();
        for key in uploaded {
            match self.blobs.delete(&key) {
                Ok(()) => {}
                Err(AppError::NotFound(_)) => {
                    tracing::debug!("Ingest {}: {} already removed", id, key);
                }
                Err(e) => {
                    tracing::error!("Ingest {}: failed to delete {}: {}", id, key, e);
                    orphaned.push(key);
                }
            }
        }

        if orphaned.is_empty() {
            tracing::info!("Ingest {} {}", id, IngestState::PersistFailedCompensated);
            AppError::PersistFailed {
                cleaned,
                source: Box::new(cause),
            }
        } else {
            tracing::error!(
                "Ingest {} {}: orphaned files {:?} need manual cleanup",
                id,
                IngestState::PersistFailedUncompensated,
                orphaned
            );
            AppError::OrphanedBlobs {
                orphaned,
                source: Box::new(cause),
            }
        }
    }
}
