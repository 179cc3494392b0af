//! IPC protocol types for service requests and responses.
//!
//! Uses length-prefixed JSON messages for reliable framing over TCP.
//! Format: 4-byte little-endian length prefix followed by JSON bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::ingest::SubmittedFile;
use crate::record::{ApplicationFields, ApplicationRecord};
use crate::search::FilterQuery;
use crate::{AppError, ErrorCategory, Result};

/// Largest accepted message body.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// A file sent with an upload request.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WireFile {
    /// Client-side file name
    pub name: String,
    /// Base64-encoded content
    pub content: String,
}

impl WireFile {
    pub fn encode(name: &str, bytes: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            content: STANDARD.encode(bytes),
        }
    }

    /// Decode into an ingest file.
    pub fn decode(self) -> Result<SubmittedFile> {
        let bytes = STANDARD.decode(self.content.as_bytes()).map_err(|e| {
            AppError::Validation(format!("file {} is not valid base64: {}", self.name, e))
        })?;
        Ok(SubmittedFile::from_bytes(&self.name, bytes))
    }
}

/// Request from client to service.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    /// Store a new application with attached files
    Upload {
        application: ApplicationFields,
        #[serde(default)]
        files: Vec<WireFile>,
    },
    /// Retrieve applications through a filter query
    Query {
        #[serde(default)]
        query: FilterQuery,
    },
    /// Replace the metadata of an application
    Update {
        id: String,
        application: ApplicationFields,
    },
    /// Get a read link for one of an application's files
    FileLink { id: String, file_name: String },
}

/// Response from service to client.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Uploaded {
        message: String,
        application: ApplicationRecord,
        num_files: usize,
    },
    Results {
        results: Vec<ApplicationRecord>,
    },
    Updated {
        message: String,
        application: ApplicationFields,
    },
    FileLink {
        url: String,
        expires_at: DateTime<Utc>,
    },
    Error {
        /// HTTP-style status code
        status: u16,
        code: ErrorCategory,
        error: String,
    },
}

impl Response {
    pub fn from_error(err: &AppError) -> Self {
        Response::Error {
            status: err.status_code(),
            code: err.category(),
            error: err.to_string(),
        }
    }
}

/// Read a length-prefixed JSON message from an async reader.
///
/// Message format:
/// - 4 bytes: little-endian u32 message length
/// - N bytes: JSON-encoded message
///
/// # Errors
/// Returns error if read fails, message is too large, or JSON parsing fails.
pub async fn read_message<T, R>(reader: &mut R) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    R: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| AppError::Ipc(format!("Failed to read message length: {}", e)))?;

    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(AppError::Ipc(format!(
            "Message too large: {} bytes (max {})",
            len, MAX_MESSAGE_SIZE
        )));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| AppError::Ipc(format!("Failed to read message body: {}", e)))?;

    serde_json::from_slice(&buf)
        .map_err(|e| AppError::Validation(format!("Failed to parse message: {}", e)))
}

/// Write a length-prefixed JSON message to an async writer.
///
/// # Errors
/// Returns error if serialization or write fails, or the message is too large.
pub async fn write_message<T, W>(writer: &mut W, message: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWriteExt + Unpin,
{
    let json = serde_json::to_vec(message)
        .map_err(|e| AppError::Ipc(format!("Failed to serialize message: {}", e)))?;

    if json.len() > MAX_MESSAGE_SIZE {
        return Err(AppError::Ipc(format!(
            "Message too large: {} bytes (max {})",
            json.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let len = json.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .await
        .map_err(|e| AppError::Ipc(format!("Failed to write message length: {}", e)))?;

    writer
        .write_all(&json)
        .await
        .map_err(|e| AppError::Ipc(format!("Failed to write message body: {}", e)))?;

    writer
        .flush()
        .await
        .map_err(|e| AppError::Ipc(format!("Failed to flush message: {}", e)))?;

    Ok(())
}
