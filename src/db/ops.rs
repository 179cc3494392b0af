//! Database operations module - application record CRUD.
//!
//! [`RecordStore`] is the record persistence seam used by the ingest
//! coordinator and the service; [`SqliteRecordStore`] implements it on top
//! of [`Database`] with every statement wrapped in the conflict retry
//! executor.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};

use super::{sqlite_error, ConflictRetryExecutor, Database, RetryPolicy, TxMode};
use crate::record::{ApplicationFields, ApplicationRecord};
use crate::search::{compile, render_literal, FilterQuery};
use crate::{AppError, Result};

/// Durable storage of application records.
pub trait RecordStore: Send + Sync {
    /// Persist a new record.
    fn insert(&self, record: &ApplicationRecord) -> Result<()>;

    /// Replace the metadata fields of an existing record.
    ///
    /// Returns [`AppError::NotFound`] when no record has this id.
    fn update(&self, id: &str, fields: &ApplicationFields) -> Result<()>;

    /// Records matching a filter query, in query order.
    fn query(&self, query: &FilterQuery) -> Result<Vec<ApplicationRecord>>;
}

/// SQLite-backed record store.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    db: Database,
    executor: ConflictRetryExecutor,
}

impl SqliteRecordStore {
    pub fn new(db: Database, policy: RetryPolicy) -> Self {
        Self {
            db,
            executor: ConflictRetryExecutor::new(policy),
        }
    }
}

/// Empty optional text is stored as NULL.
fn nullable(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

fn optional_text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Map a row of the fixed column projection to a record.
fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ApplicationRecord> {
    let date_applied: String = row.get(10)?;
    let date_applied = DateTime::parse_from_rfc3339(&date_applied)
        .map_err(|e| conversion_error(10, e))?
        .with_timezone(&Utc);

    let files: String = row.get(11)?;
    let files: Vec<String> = serde_json::from_str(&files).map_err(|e| conversion_error(11, e))?;

    Ok(ApplicationRecord {
        id: row.get(0)?,
        fields: ApplicationFields {
            title: row.get(1)?,
            company: optional_text(row, 2)?,
            description: optional_text(row, 3)?,
            location: optional_text(row, 4)?,
            date_posted: optional_text(row, 5)?,
            url: optional_text(row, 6)?,
            internal_id: optional_text(row, 7)?,
            source: optional_text(row, 8)?,
            reposted: row.get(9)?,
            date_applied,
        },
        files,
    })
}

/// Insert a record on an open connection.
pub fn insert_application(conn: &Connection, record: &ApplicationRecord) -> Result<()> {
    let files = serde_json::to_string(&record.files)
        .map_err(|e| AppError::Database(format!("Failed to encode file list: {}", e)))?;
    let f = &record.fields;

    conn.execute(
        "INSERT INTO job_application
            (id, title, company, description, location, date_posted, url, internal_id, source, reposted, date_applied, files)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            record.id,
            f.title,
            nullable(&f.company),
            nullable(&f.description),
            nullable(&f.location),
            nullable(&f.date_posted),
            nullable(&f.url),
            nullable(&f.internal_id),
            nullable(&f.source),
            f.reposted,
            format_timestamp(&f.date_applied),
            files,
        ],
    )
    .map_err(|e| sqlite_error(e, "Failed to insert application"))?;

    Ok(())
}

/// Replace the metadata of a record on an open connection.
///
/// # Returns
/// The number of rows changed (0 or 1).
pub fn update_application(conn: &Connection, id: &str, f: &ApplicationFields) -> Result<usize> {
    conn.execute(
        "UPDATE job_application
         SET title = ?1, company = ?2, description = ?3, location = ?4, date_posted = ?5,
             url = ?6, internal_id = ?7, source = ?8, reposted = ?9, date_applied = ?10
         WHERE id = ?11",
        params![
            f.title,
            nullable(&f.company),
            nullable(&f.description),
            nullable(&f.location),
            nullable(&f.date_posted),
            nullable(&f.url),
            nullable(&f.internal_id),
            nullable(&f.source),
            f.reposted,
            format_timestamp(&f.date_applied),
            id,
        ],
    )
    .map_err(|e| sqlite_error(e, "Failed to update application"))
}

/// Run a filter query on an open connection.
pub fn query_applications(conn: &Connection, query: &FilterQuery) -> Result<Vec<ApplicationRecord>> {
    let compiled = compile(query)?;

    let mut stmt = conn
        .prepare_cached(&compiled.sql)
        .map_err(|e| sqlite_error(e, "Failed to prepare query"))?;

    let rows = stmt
        .query_map(params_from_iter(compiled.params.iter()), record_from_row)
        .map_err(|e| sqlite_error(e, "Failed to execute query"))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| sqlite_error(e, "Failed to read row"))?);
    }

    Ok(results)
}

impl RecordStore for SqliteRecordStore {
    fn insert(&self, record: &ApplicationRecord) -> Result<()> {
        self.executor
            .run(&self.db, TxMode::Write, |conn| insert_application(conn, record))?;
        tracing::debug!("Stored application {}", record.id);
        Ok(())
    }

    fn update(&self, id: &str, fields: &ApplicationFields) -> Result<()> {
        self.executor.run(&self.db, TxMode::Write, |conn| {
            match update_application(conn, id, fields)? {
                0 => Err(AppError::NotFound(format!("application {}", id))),
                _ => Ok(()),
            }
        })?;
        tracing::debug!("Updated application {}", id);
        Ok(())
    }

    fn query(&self, query: &FilterQuery) -> Result<Vec<ApplicationRecord>> {
        // Reject bad queries before opening a transaction
        let text = render_literal(query)?;
        tracing::debug!("Executing query: {}", text);

        self.executor
            .run(&self.db, TxMode::Read, |conn| query_applications(conn, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_database;
    use crate::record::fixtures;
    use crate::search::{Combinator, Operator, Predicate, PredicateGroup, SortOrder};
    use chrono::Duration;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, SqliteRecordStore) {
        let temp = TempDir::new().unwrap();
        let db = open_database(&temp.path().join("apps.db")).unwrap();
        (temp, SqliteRecordStore::new(db, RetryPolicy::default()))
    }

    fn record(id: &str, title: &str, company: &str, days_ago: i64) -> ApplicationRecord {
        let mut fields = fixtures::fields(title, company);
        fields.date_applied = fields.date_applied - Duration::days(days_ago);
        ApplicationRecord {
            id: id.to_string(),
            fields,
            files: vec![format!("cv_{}.pdf", id)],
        }
    }

    #[test]
    fn test_insert_and_query_all() {
        let (_temp, store) = setup_store();
        store.insert(&record("a", "Engineer", "Acme", 2)).unwrap();
        store.insert(&record("b", "Designer", "Globex", 0)).unwrap();
        store.insert(&record("c", "Manager", "Initech", 1)).unwrap();

        let results = store.query(&FilterQuery::default()).unwrap();

        // Default order: newest application first
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(results[2], record("a", "Engineer", "Acme", 2));
    }

    #[test]
    fn test_query_empty_store() {
        let (_temp, store) = setup_store();
        assert!(store.query(&FilterQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn test_query_with_filter_and_pagination() {
        let (_temp, store) = setup_store();
        for i in 0..5 {
            store
                .insert(&record(&format!("acme-{}", i), "Engineer", "Acme Corp", i))
                .unwrap();
        }
        store.insert(&record("other", "Engineer", "Globex", 0)).unwrap();

        let query = FilterQuery {
            filter: Some(
                PredicateGroup::new(Combinator::And)
                    .with_filter(Predicate::new("company", Operator::Contains, "Acme")),
            ),
            sort_by: Some("id".into()),
            sort_order: Some(SortOrder::Asc),
            limit: 2,
            page: 2,
        };

        let results = store.query(&query).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["acme-2", "acme-3"]);
    }

    #[test]
    fn test_query_numeric_and_null_checks() {
        let (_temp, store) = setup_store();
        let mut reposted = record("r", "Engineer", "Acme", 0);
        reposted.fields.reposted = true;
        store.insert(&reposted).unwrap();
        store.insert(&record("n", "Engineer", "Acme", 1)).unwrap();

        let query = FilterQuery {
            filter: Some(
                PredicateGroup::new(Combinator::And)
                    .with_filter(Predicate::new("reposted", Operator::Equals, "1"))
                    .with_filter(Predicate::null_check("url", Operator::IsNotEmpty)),
            ),
            ..Default::default()
        };

        let results = store.query(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "r");
        assert!(results[0].fields.reposted);
    }

    #[test]
    fn test_empty_fields_match_null_checks() {
        let (_temp, store) = setup_store();
        let mut unlisted = record("unlisted", "Engineer", "Acme", 0);
        unlisted.fields.url = String::new();
        store.insert(&unlisted).unwrap();
        store.insert(&record("listed", "Engineer", "Acme", 1)).unwrap();

        let by_url = |operator| FilterQuery {
            filter: Some(
                PredicateGroup::new(Combinator::And)
                    .with_filter(Predicate::null_check("url", operator)),
            ),
            ..Default::default()
        };

        let empty = store.query(&by_url(Operator::IsEmpty)).unwrap();
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].id, "unlisted");
        // Read back as an empty string, not a missing field
        assert_eq!(empty[0], unlisted);

        let not_empty = store.query(&by_url(Operator::IsNotEmpty)).unwrap();
        let ids: Vec<&str> = not_empty.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["listed"]);
    }

    #[test]
    fn test_update_clearing_field_makes_it_empty() {
        let (_temp, store) = setup_store();
        store.insert(&record("a", "Engineer", "Acme", 0)).unwrap();

        let mut fields = record("a", "Engineer", "Acme", 0).fields;
        fields.location = String::new();
        store.update("a", &fields).unwrap();

        let query = FilterQuery {
            filter: Some(
                PredicateGroup::new(Combinator::And)
                    .with_filter(Predicate::null_check("location", Operator::IsEmpty)),
            ),
            ..Default::default()
        };
        let results = store.query(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fields.location, "");
    }

    #[test]
    fn test_contains_matches_literal_percent() {
        let (_temp, store) = setup_store();
        store.insert(&record("a", "100% remote", "Acme", 0)).unwrap();
        store.insert(&record("b", "1000 perks", "Acme", 0)).unwrap();

        let query = FilterQuery {
            filter: Some(
                PredicateGroup::new(Combinator::And)
                    .with_filter(Predicate::new("title", Operator::Contains, "100%")),
            ),
            ..Default::default()
        };

        let results = store.query(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[test]
    fn test_update_replaces_fields() {
        let (_temp, store) = setup_store();
        store.insert(&record("a", "Engineer", "Acme", 0)).unwrap();

        let mut fields = fixtures::fields("Staff Engineer", "Acme");
        fields.reposted = true;
        store.update("a", &fields).unwrap();

        let results = store.query(&FilterQuery::default()).unwrap();
        assert_eq!(results[0].fields, fields);
        // File keys are not touched by an update
        assert_eq!(results[0].files, vec!["cv_a.pdf".to_string()]);
    }

    #[test]
    fn test_update_missing_id_is_not_found() {
        let (_temp, store) = setup_store();
        let result = store.update("missing", &fixtures::fields("a", "b"));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let (_temp, store) = setup_store();
        store.insert(&record("a", "Engineer", "Acme", 0)).unwrap();

        let result = store.insert(&record("a", "Engineer", "Acme", 0));
        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[test]
    fn test_invalid_query_rejected() {
        let (_temp, store) = setup_store();
        let query = FilterQuery {
            filter: Some(
                PredicateGroup::new(Combinator::And)
                    .with_filter(Predicate::new("title", Operator::Like, "7")),
            ),
            ..Default::default()
        };
        assert!(matches!(store.query(&query), Err(AppError::Compiler(_))));
    }
}
