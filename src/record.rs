//! Application record types shared by the store, the ingest path and IPC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Table holding application records.
pub const TABLE: &str = "job_application";

/// Column projection, in the order rows are read back.
pub const COLUMNS: [&str; 12] = [
    "id",
    "title",
    "company",
    "description",
    "location",
    "date_posted",
    "url",
    "internal_id",
    "source",
    "reposted",
    "date_applied",
    "files",
];

/// Default ordering column for queries without an explicit sort.
pub const DEFAULT_SORT_COLUMN: &str = "date_applied";

/// Whether `name` is a column of the application table.
pub fn is_column(name: &str) -> bool {
    COLUMNS.contains(&name)
}

/// Mutable metadata of a job application, as submitted by the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApplicationFields {
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    /// Posting date as given by the source site (free-form)
    #[serde(default)]
    pub date_posted: String,
    #[serde(default)]
    pub url: String,
    /// Identifier of the posting on the source site
    #[serde(default)]
    pub internal_id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub reposted: bool,
    pub date_applied: DateTime<Utc>,
}

/// A stored job application.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApplicationRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: ApplicationFields,
    /// Blob store keys of the attached files, in submission order
    #[serde(default)]
    pub files: Vec<String>,
}

impl ApplicationRecord {
    /// Build an in-flight record with `num_files` empty key slots.
    pub fn new(id: String, fields: ApplicationFields, num_files: usize) -> Self {
        Self {
            id,
            fields,
            files: vec![String::new(); num_files],
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_flat() {
        let record = ApplicationRecord {
            id: "abc".to_string(),
            fields: fixtures::fields("Engineer", "Acme"),
            files: vec!["cv-0930-020324_abc.pdf".to_string()],
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["title"], "Engineer");
        assert_eq!(json["files"][0], "cv-0930-020324_abc.pdf");

        let parsed: ApplicationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_new_record_has_placeholder_slots() {
        let record = ApplicationRecord::new("id".into(), fixtures::fields("a", "b"), 3);
        assert_eq!(record.files, vec![String::new(); 3]);
    }

    #[test]
    fn test_is_column() {
        assert!(is_column("company"));
        assert!(!is_column("company; DROP TABLE job_application"));
    }
}
