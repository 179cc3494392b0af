//! Service composition - wires the stores together for request handling.
//!
//! [`Service`] is built once at startup from a [`ServiceConfig`] and shared
//! by reference between requests. It owns:
//! - The record store (SQLite with conflict retries)
//! - The blob store (local bucket with signed links)
//! - The ingest coordinator over both

pub mod config;

pub use config::{EnvSource, ProcessEnv, ServiceConfig};

use std::sync::Arc;

use crate::blob::{embedded_record_id, BlobStore, ContentHeaders, LocalBlobStore, PresignedUrl, SignedUrlGenerator};
use crate::db::{open_database_with, RecordStore, SqliteRecordStore};
use crate::ingest::{IngestCoordinator, IngestReceipt, SubmittedFile};
use crate::record::{ApplicationFields, ApplicationRecord};
use crate::search::FilterQuery;
use crate::{AppError, Result};

/// Request handling over the record and blob stores.
pub struct Service {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    coordinator: IngestCoordinator,
}

impl Service {
    /// Build a service from explicit collaborators.
    pub fn new(records: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Self {
        let coordinator = IngestCoordinator::new(records.clone(), blobs.clone());
        Self {
            records,
            blobs,
            coordinator,
        }
    }

    /// Open the SQLite database and local bucket described by `config`.
    pub fn open(config: &ServiceConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let db_path = config.database_path();
        let db = open_database_with(&db_path, config.busy_timeout())?;
        tracing::info!("Database opened: {:?}", db_path);
        let records = SqliteRecordStore::new(db, config.retry.policy());

        let secret = match &config.signing_secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                tracing::warn!("No signing secret configured, file links will not survive a restart");
                uuid::Uuid::new_v4().as_bytes().to_vec()
            }
        };
        let signer = SignedUrlGenerator::new(&secret, config.link_ttl())?;
        let blobs = LocalBlobStore::open(config.blob_root(), &config.bucket, signer, &config.public_url)?;
        tracing::info!("Blob bucket opened: {}", blobs.bucket());

        Ok(Self::new(Arc::new(records), Arc::new(blobs)))
    }

    /// Store a new application with its files.
    pub fn upload(
        &self,
        fields: ApplicationFields,
        files: Vec<SubmittedFile>,
    ) -> Result<IngestReceipt> {
        self.coordinator.ingest(fields, files)
    }

    /// Applications matching a filter query.
    pub fn query(&self, query: &FilterQuery) -> Result<Vec<ApplicationRecord>> {
        self.records.query(query)
    }

    /// Replace the metadata of application `id`, echoing the new fields.
    pub fn update(&self, id: &str, fields: ApplicationFields) -> Result<ApplicationFields> {
        if id.is_empty() {
            return Err(AppError::Validation("application id is required".into()));
        }
        self.records.update(id, &fields)?;
        Ok(fields)
    }

    /// A time-limited read link for one of application `id`'s files.
    ///
    /// The record id embedded in `file_name` must equal `id`.
    pub fn file_link(&self, id: &str, file_name: &str) -> Result<PresignedUrl> {
        if file_name.is_empty() {
            return Err(AppError::Validation("file name is required".into()));
        }
        if embedded_record_id(file_name) != Some(id) {
            return Err(AppError::Validation(
                "file id does not match the requested id".into(),
            ));
        }

        self.blobs.presign(file_name, &ContentHeaders::for_key(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures;
    use crate::search::{Combinator, Operator, Predicate, PredicateGroup};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn open_service(temp: &TempDir) -> Service {
        let env: HashMap<String, String> = [
            ("JOBAPPS_DATA_DIR".to_string(), temp.path().to_str().unwrap().to_string()),
            ("JOBAPPS_SIGNING_SECRET".to_string(), "test".to_string()),
        ]
        .into_iter()
        .collect();
        let config = ServiceConfig::load_from(&env).unwrap();
        Service::open(&config).unwrap()
    }

    #[test]
    fn test_upload_query_update() {
        let temp = TempDir::new().unwrap();
        let service = open_service(&temp);

        let receipt = service
            .upload(
                fixtures::fields("Engineer", "Acme"),
                vec![
                    SubmittedFile::from_bytes("cv.pdf", b"%PDF".to_vec()),
                    SubmittedFile::from_bytes("letter.txt", b"hi".to_vec()),
                ],
            )
            .unwrap();
        assert_eq!(receipt.num_files, 2);
        let id = receipt.application.id.clone();

        let stored = temp.path().join("blobs").join("job-applications");
        for key in &receipt.application.files {
            assert!(stored.join(key).exists());
        }

        let mut fields = fixtures::fields("Senior Engineer", "Acme");
        fields.reposted = true;
        let echoed = service.update(&id, fields.clone()).unwrap();
        assert_eq!(echoed, fields);

        let query = FilterQuery {
            filter: Some(
                PredicateGroup::new(Combinator::And)
                    .with_filter(Predicate::new("title", Operator::Contains, "Senior")),
            ),
            ..Default::default()
        };
        let results = service.query(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].files, receipt.application.files);
    }

    #[test]
    fn test_file_link_content_types() {
        let temp = TempDir::new().unwrap();
        let service = open_service(&temp);

        let pdf = service.file_link("abc", "cv-1200-010624_abc.pdf").unwrap();
        assert!(pdf.url.contains("content-type=application%2Fpdf"));

        let txt = service.file_link("abc", "notes-1200-010624_abc.txt").unwrap();
        assert!(txt.url.contains("content-type=text%2Fplain"));
        assert!(txt.url.contains("disposition=inline"));
    }

    #[test]
    fn test_file_link_id_mismatch_rejected() {
        let temp = TempDir::new().unwrap();
        let service = open_service(&temp);

        let err = service
            .file_link("abc", "cv-1200-010624_xyz.pdf")
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.status_code(), 400);

        assert!(matches!(
            service.file_link("abc", ""),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.file_link("abc", "no-separator.pdf"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_update_missing_record() {
        let temp = TempDir::new().unwrap();
        let service = open_service(&temp);

        let err = service
            .update("missing", fixtures::fields("a", "b"))
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
