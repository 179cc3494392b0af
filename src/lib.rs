//! jobapps - job application ingest and retrieval.
//!
//! This library provides the core of the jobapps service: the filter-language
//! query compiler, the SQLite record store with conflict retries, the blob
//! store for attached files, and the ingest coordinator that keeps the two
//! stores consistent.

pub mod blob;
pub mod db;
pub mod ingest;
pub mod ipc;
pub mod record;
pub mod search;
pub mod service;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types covering all failure modes.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed request data (bad filter, missing field, mismatched file id)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A predicate fell outside every rendering rule
    #[error("Query compiler error: {0}")]
    Compiler(String),

    /// Record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transient serialization conflict reported by the store (retryable)
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Conflict retries ran out before the transaction could commit
    #[error("Transaction failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    /// Database errors (SQLite operations)
    #[error("Database error: {0}")]
    Database(String),

    /// Blob store errors (put/delete/presign)
    #[error("Blob store error: {0}")]
    Blob(String),

    /// A file upload failed during ingest; no record was stored
    #[error("Failed to upload file {file}: {reason}")]
    UploadFailed {
        file: String,
        /// Keys written before the failing file, left in the blob store
        uploaded: Vec<String>,
        reason: String,
    },

    /// Record persist failed and every uploaded file was removed again
    #[error("Failed to store application ({cleaned} uploaded files removed): {source}")]
    PersistFailed {
        cleaned: usize,
        #[source]
        source: Box<AppError>,
    },

    /// Record persist failed and some uploaded files could not be removed
    #[error("Failed to delete uploaded files after failing to store application, orphaned: {orphaned:?}: {source}")]
    OrphanedBlobs {
        orphaned: Vec<String>,
        #[source]
        source: Box<AppError>,
    },

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IPC errors (framing, connection)
    #[error("IPC error: {0}")]
    Ipc(String),

    /// I/O errors (file/network operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable, machine-readable error category sent to clients.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Compiler,
    NotFound,
    Conflict,
    Store,
    Blob,
    UploadFailed,
    StoreFailed,
    OrphanedFiles,
    Internal,
}

impl AppError {
    /// Whether the failed transaction should be retried from scratch.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Validation(_) => ErrorCategory::Validation,
            AppError::Compiler(_) => ErrorCategory::Compiler,
            AppError::NotFound(_) => ErrorCategory::NotFound,
            AppError::Conflict(_) => ErrorCategory::Conflict,
            AppError::RetriesExhausted { .. } | AppError::Database(_) => ErrorCategory::Store,
            AppError::Blob(_) => ErrorCategory::Blob,
            AppError::UploadFailed { .. } => ErrorCategory::UploadFailed,
            AppError::PersistFailed { .. } => ErrorCategory::StoreFailed,
            AppError::OrphanedBlobs { .. } => ErrorCategory::OrphanedFiles,
            AppError::Config(_) | AppError::Ipc(_) | AppError::Io(_) => ErrorCategory::Internal,
        }
    }

    /// HTTP-style status code for the error.
    pub fn status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::Compiler => 400,
            ErrorCategory::NotFound => 404,
            _ => 500,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
