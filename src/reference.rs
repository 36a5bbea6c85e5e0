// 📮 Reference Loader - postcode history table
//
// Columns: postcode, postcode_introduced, postcode_terminated, lat, long
// Dates are compact YYYYMM tokens meaning the 1st of that month.
// An empty terminated date means the postcode is still in use.

use crate::error::PipelineError;
use crate::normalizer::parse_coordinate;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

const REQUIRED_COLUMNS: &[&str] = &[
    "postcode",
    "postcode_introduced",
    "postcode_terminated",
    "lat",
    "long",
];

// ============================================================================
// CORE TYPES
// ============================================================================

/// One period of one postcode. The same postcode string may appear in
/// several rows covering different periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostcodeReference {
    pub postcode: String,
    pub introduced: Option<NaiveDate>,
    /// None = still valid
    pub terminated: Option<NaiveDate>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl PostcodeReference {
    pub fn is_open_ended(&self) -> bool {
        self.terminated.is_none()
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Row as it sits in the file. Everything is read as text so that a bad
/// value degrades to a missing field instead of failing the load.
#[derive(Debug, Deserialize)]
struct RawReferenceRow {
    postcode: String,
    postcode_introduced: String,
    postcode_terminated: String,
    lat: String,
    long: String,
}

impl From<RawReferenceRow> for PostcodeReference {
    fn from(raw: RawReferenceRow) -> Self {
        PostcodeReference {
            postcode: raw.postcode,
            introduced: parse_year_month(&raw.postcode_introduced),
            terminated: parse_year_month(&raw.postcode_terminated),
            latitude: parse_coordinate(&raw.lat),
            longitude: parse_coordinate(&raw.long),
        }
    }
}

// ============================================================================
// DATE TOKENS
// ============================================================================

/// Parse a `YYYYMM` token into the first day of that month.
///
/// Empty input is missing (open-ended). An ISO `YYYY-MM-DD` date is taken
/// as-is. Anything else that is not exactly six digits with a real month
/// is missing.
pub fn parse_year_month(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let year: i32 = raw[..4].parse().ok()?;
    let month: u32 = raw[4..].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

// ============================================================================
// LOADER
// ============================================================================

/// Load the whole reference table, in file order.
pub fn load_reference(path: &Path) -> Result<Vec<PostcodeReference>> {
    let file = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open reference file: {}", file))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", file))?
        .clone();

    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == *column) {
            return Err(PipelineError::MissingColumn {
                file: file.clone(),
                column: column.to_string(),
            }
            .into());
        }
    }

    let mut references = Vec::new();
    for (line_num, result) in reader.deserialize::<RawReferenceRow>().enumerate() {
        let raw = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, file)
        })?;
        references.push(PostcodeReference::from(raw));
    }

    let open_ended = references.iter().filter(|r| r.is_open_ended()).count();
    tracing::info!(
        rows = references.len(),
        open_ended,
        "loaded postcode reference from {}",
        file
    );

    Ok(references)
}

// ============================================================================
// TESTS
// ============================================================================
