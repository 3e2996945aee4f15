//! Append-only CSV persistence keyed on the posting id column.
//!
//! An append reads only the key column of the existing file and then opens
//! it in append mode; the file is never rewritten, so the cost of a run is
//! proportional to the records it adds.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::SecondsFormat;
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{HarvesterError, Result};
use crate::text::{strip_line_breaks, truncate_with_marker, CONTINUATION_MARKER};
use crate::types::JobPosting;

/// Stable column order of the output file.
pub const HEADERS: [&str; 16] = [
    "Job Title",
    "Salary",
    "Contact",
    "Email",
    "Location",
    "Posting ID",
    "Posted Date",
    "Category",
    "Employment Type",
    "Company",
    "Requirements",
    "Benefits",
    "Description",
    "Job URL",
    "Scraped At",
    "Is Sponsored",
];

/// Index of the "Posting ID" key column.
pub const POSTING_ID_COLUMN: usize = 5;

/// Per-field length caps applied when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCaps {
    pub requirements: usize,
    pub benefits: usize,
    pub description: usize,
}

impl Default for FieldCaps {
    fn default() -> Self {
        Self {
            requirements: 500,
            benefits: 300,
            description: 1500,
        }
    }
}

/// Counts of one append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub written: usize,
    pub skipped_duplicate: usize,
}

/// Read the posting ids already present in `path`.
///
/// A missing file has no ids. Rows that cannot be parsed are skipped; a read
/// failure is a persistence error.
pub fn existing_ids(path: &Path) -> Result<HashSet<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(persistence(path, e.into())),
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let mut ids = HashSet::new();
    for (line, row) in reader.records().enumerate() {
        match row {
            Ok(row) => {
                if let Some(id) = row.get(POSTING_ID_COLUMN).map(str::trim) {
                    if !id.is_empty() {
                        ids.insert(id.to_string());
                    }
                }
            }
            Err(e) if e.is_io_error() => return Err(persistence(path, e)),
            Err(e) => tracing::warn!(
                path = %path.display(),
                row = line + 1,
                error = %e,
                "skipping unreadable CSV row"
            ),
        }
    }
    Ok(ids)
}

fn persistence(path: &Path, source: csv::Error) -> HarvesterError {
    HarvesterError::Persistence {
        path: path.to_path_buf(),
        source,
    }
}

fn ends_with_newline(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Writes posting rows to a CSV file.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSink {
    caps: FieldCaps,
}

impl CsvSink {
    #[must_use]
    pub fn new(caps: FieldCaps) -> Self {
        Self { caps }
    }

    /// The sanitized row for one record.
    pub fn row(&self, record: &JobPosting) -> [String; 16] {
        let clean = |s: &str| strip_line_breaks(s);
        let capped =
            |s: &str, cap: usize| truncate_with_marker(&clean(s), cap, CONTINUATION_MARKER);

        [
            clean(&record.title),
            clean(&record.salary),
            clean(&record.contact),
            clean(&record.email),
            clean(&record.location),
            clean(&record.posting_id),
            clean(&record.posted_date),
            clean(&record.category),
            clean(&record.employment_type),
            clean(&record.company),
            capped(&record.requirements, self.caps.requirements),
            capped(&record.benefits, self.caps.benefits),
            capped(&record.description, self.caps.description),
            record.url.clone(),
            record.scraped_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            if record.is_sponsored { "Yes" } else { "No" }.to_string(),
        ]
    }

    /// Append the records whose posting id is not yet in `path`.
    ///
    /// Records without a posting id are always written. Duplicates inside
    /// `records` are skipped like existing ones.
    pub fn append(&self, records: &[JobPosting], path: &Path) -> Result<AppendOutcome> {
        let mut known = existing_ids(path)?;
        self.append_known(records, path, &mut known)
    }

    /// Append against an id set the caller already holds for `path`.
    ///
    /// `known` is extended with every id written, so a run can append one
    /// record at a time without re-reading the file.
    pub fn append_known(
        &self,
        records: &[JobPosting],
        path: &Path,
        known: &mut HashSet<String>,
    ) -> Result<AppendOutcome> {
        let mut outcome = AppendOutcome::default();

        let rows: Vec<[String; 16]> = records
            .iter()
            .filter(|record| match record.id() {
                Some(id) if !known.insert(id.to_string()) => {
                    tracing::debug!(posting_id = id, "already in CSV, skipping");
                    outcome.skipped_duplicate += 1;
                    false
                }
                _ => true,
            })
            .map(|record| self.row(record))
            .collect();

        if rows.is_empty() {
            return Ok(outcome);
        }

        let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persistence(path, e.into()))?;
        }
        let needs_newline =
            !is_new && !ends_with_newline(path).map_err(|e| persistence(path, e.into()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| persistence(path, e.into()))?;
        if needs_newline {
            file.write_all(b"\n").map_err(|e| persistence(path, e.into()))?;
        }

        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(file);

        if is_new {
            writer
                .write_record(HEADERS)
                .map_err(|e| persistence(path, e))?;
        }
        for row in &rows {
            writer.write_record(row).map_err(|e| persistence(path, e))?;
        }
        writer.flush().map_err(|e| persistence(path, e.into()))?;

        outcome.written = rows.len();
        tracing::info!(
            path = %path.display(),
            written = outcome.written,
            skipped_duplicate = outcome.skipped_duplicate,
            "appended records to CSV"
        );
        Ok(outcome)
    }
}
