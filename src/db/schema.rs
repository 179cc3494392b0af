//! Database schema module - table definitions.
//!
//! This module contains the SQL schema for the application database.

use rusqlite::Connection;

use super::sqlite_error;
use crate::Result;

/// Initialize the database schema.
///
/// Creates the job_application table and its indexes if they don't already
/// exist. This is called on every database open.
///
/// # Schema
///
/// ## job_application table
/// - `id`: Record id (UUID text), primary key
/// - `title`: Posting title, required
/// - `company`, `description`, `location`: Posting metadata
/// - `date_posted`: Posting date as reported by the source (free-form text)
/// - `url`: Posting URL
/// - `internal_id`: Identifier of the posting on the source site
/// - `source`: Where the posting was found
///
/// The optional text columns hold NULL for an empty value, so `IS NULL`
/// filters match unset fields.
/// - `reposted`: Whether the posting was a repost (0/1)
/// - `date_applied`: RFC 3339 timestamp of the application
/// - `files`: JSON array of blob store keys
///
/// ## Indexes
/// - `idx_job_application_date_applied`: Default query ordering
/// - `idx_job_application_company`: Common filter column
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS job_application (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            company TEXT,
            description TEXT,
            location TEXT,
            date_posted TEXT,
            url TEXT,
            internal_id TEXT,
            source TEXT,
            reposted INTEGER NOT NULL DEFAULT 0,
            date_applied TEXT NOT NULL,
            files TEXT NOT NULL DEFAULT '[]'
        );

        -- Index for the default ordering (newest applications first)
        CREATE INDEX IF NOT EXISTS idx_job_application_date_applied
            ON job_application(date_applied);

        CREATE INDEX IF NOT EXISTS idx_job_application_company
            ON job_application(company COLLATE NOCASE);
        "#,
    )
    .map_err(|e| sqlite_error(e, "Failed to initialize schema"))?;

    Ok(())
}
