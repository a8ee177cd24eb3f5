//! Export of captured sections as named image files and a single archive.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use chrono::{DateTime, Local, Utc};
use tracing::{debug, info};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{CaptureError, CaptureResult};
use crate::section::Section;

const EXPORT_EXTENSION: &str = "jpg";

/// One file ready for archiving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Packs exported files into one downloadable blob
pub trait Archiver {
    fn archive(&self, files: &[ExportFile]) -> CaptureResult<Vec<u8>>;
}

/// Writes every file as a stored (uncompressed) zip entry
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn archive(&self, files: &[ExportFile]) -> CaptureResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for file in files {
            writer
                .start_file(file.name.as_str(), options)
                .map_err(CaptureError::Archive)?;
            writer.write_all(&file.bytes)?;
        }

        let cursor = writer.finish().map_err(CaptureError::Archive)?;
        let bytes = cursor.into_inner();
        debug!(files = files.len(), size = bytes.len(), "Packed section archive");
        Ok(bytes)
    }
}

/// Name of the archive delivered for a document
pub fn archive_name(document_name: &str) -> String {
    format!("{}-sections.zip", document_name)
}

fn clock_time(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// `page-<n>-<kind>-<HH-MM-SS>-to-<HH-MM-SS>.jpg`
pub fn export_file_name(section: &Section) -> String {
    format!(
        "page-{}-{}-{}-to-{}.{}",
        section.page_number,
        section.kind(),
        clock_time(&section.capture_start_time),
        clock_time(&section.capture_end_time),
        EXPORT_EXTENSION
    )
    .replace(':', "-")
}

/// One file per section, in collection order, with unique names.
///
/// Sections captured within the same second would share a name; later ones get
/// a `-2`, `-3`, ... suffix.
pub fn export_all(sections: &[Section]) -> Vec<ExportFile> {
    let mut used = HashSet::with_capacity(sections.len());
    let files: Vec<ExportFile> = sections
        .iter()
        .map(|section| {
            let base = export_file_name(section);
            let mut name = base.clone();
            let mut suffix = 2;
            while !used.insert(name.clone()) {
                let stem = base.trim_end_matches(&format!(".{}", EXPORT_EXTENSION));
                name = format!("{}-{}.{}", stem, suffix, EXPORT_EXTENSION);
                suffix += 1;
            }
            ExportFile {
                name,
                bytes: section.image.bytes.clone(),
            }
        })
        .collect();

    info!(files = files.len(), "Exported sections");
    files
}
