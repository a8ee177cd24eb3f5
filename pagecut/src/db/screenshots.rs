//! Saved section images ("screenshots") keyed by document name.

use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use serde::Serialize;
use uuid::Uuid;

use super::Database;
use crate::error::{CaptureResult, DatabaseError};
use crate::section::Section;

/// A screenshot to be saved; id and timestamp are assigned on insert
#[derive(Debug, Clone)]
pub struct NewScreenshot {
    pub pdf_name: String,
    pub page_number: u32,
    pub y_position: u32,
    pub mime_type: String,
    pub image: Vec<u8>,
}

impl NewScreenshot {
    pub fn from_section(pdf_name: &str, section: &Section) -> Self {
        Self {
            pdf_name: pdf_name.to_string(),
            page_number: section.page_number,
            y_position: section.interval.y0(),
            mime_type: section.image.mime_type.to_string(),
            image: section.image.bytes.clone(),
        }
    }
}

/// Saved screenshot record
#[derive(Debug, Clone, Serialize)]
pub struct Screenshot {
    pub id: String,
    pub pdf_name: String,
    pub page_number: u32,
    pub y_position: u32,
    pub mime_type: String,
    #[serde(skip)]
    pub image: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Screenshot {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: String = row.get(6)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
            })?;

        Ok(Self {
            id: row.get(0)?,
            pdf_name: row.get(1)?,
            page_number: row.get(2)?,
            y_position: row.get(3)?,
            mime_type: row.get(4)?,
            image: row.get(5)?,
            created_at,
        })
    }
}

impl Database {
    /// Save a screenshot, returning the stored record
    pub fn save_screenshot(&self, screenshot: NewScreenshot) -> CaptureResult<Screenshot> {
        let conn = self.conn()?;
        let saved = Screenshot {
            id: Uuid::new_v4().to_string(),
            pdf_name: screenshot.pdf_name,
            page_number: screenshot.page_number,
            y_position: screenshot.y_position,
            mime_type: screenshot.mime_type,
            image: screenshot.image,
            created_at: Utc::now(),
        };

        conn.execute(
            r#"
            INSERT INTO screenshots (id, pdf_name, page_number, y_position, mime_type, image, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                saved.id,
                saved.pdf_name,
                saved.page_number,
                saved.y_position,
                saved.mime_type,
                saved.image,
                saved.created_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(saved)
    }

    /// List screenshots.
    ///
    /// Filtered by document they are ordered top to bottom through the document;
    /// unfiltered they come back in the order they were saved.
    pub fn list_screenshots(&self, pdf_name: Option<&str>) -> CaptureResult<Vec<Screenshot>> {
        let conn = self.conn()?;
        const COLUMNS: &str =
            "SELECT id, pdf_name, page_number, y_position, mime_type, image, created_at FROM screenshots";

        let screenshots = match pdf_name {
            Some(name) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "{} WHERE pdf_name = ?1 ORDER BY page_number, y_position, rowid",
                        COLUMNS
                    ))
                    .map_err(DatabaseError::Query)?;
                let rows = stmt
                    .query_map(params![name], Screenshot::from_row)
                    .map_err(DatabaseError::Query)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(DatabaseError::Query)?;
                rows
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!("{} ORDER BY rowid", COLUMNS))
                    .map_err(DatabaseError::Query)?;
                let rows = stmt
                    .query_map([], Screenshot::from_row)
                    .map_err(DatabaseError::Query)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(DatabaseError::Query)?;
                rows
            }
        };

        Ok(screenshots)
    }
}
