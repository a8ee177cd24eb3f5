//! Database schema migrations.

use rusqlite::Connection;

use crate::error::{CaptureResult, DatabaseError};

/// Run all database migrations.
///
/// Called during database initialization to ensure the schema is up to date.
pub(super) fn run_migrations(conn: &Connection) -> CaptureResult<()> {
    conn.execute_batch(
        r#"
        -- Captured section images, keyed by the document they came from
        CREATE TABLE IF NOT EXISTS screenshots (
            id TEXT PRIMARY KEY,
            pdf_name TEXT NOT NULL,
            page_number INTEGER NOT NULL,
            y_position INTEGER NOT NULL,
            mime_type TEXT NOT NULL,
            image BLOB NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_screenshots_pdf ON screenshots(pdf_name, page_number, y_position);
        "#,
    )
    .map_err(DatabaseError::Query)?;

    Ok(())
}
