// 🧹 Normalizer - raw address rows → typed AddressRecords
//
// Every field parser is total: malformed input becomes `None` and the run
// carries on. A missing field can only ever make an address fail
// validation, it never aborts the pipeline.

use crate::config::AddressColumns;
use crate::error::PipelineError;
use chrono::NaiveDate;
use csv::StringRecord;
use serde::{Deserialize, Serialize};

// ============================================================================
// ADDRESS RECORD
// ============================================================================

/// One normalized row of the address list.
///
/// `postcode` starts as the token extracted from `location` and is only a
/// join key at that point. After matching it holds the validating
/// reference postcode, or `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Position of the row in the input file (0-based, header excluded)
    pub row_index: usize,
    pub identifier: Option<i64>,
    pub registration_date: Option<NaiveDate>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: String,
    pub postcode: Option<String>,
    pub validated: bool,
}

impl AddressRecord {
    /// Build a record from one raw CSV row.
    pub fn from_row(
        row_index: usize,
        row: &StringRecord,
        columns: &ColumnIndex,
        date_formats: &[String],
    ) -> Self {
        let field = |i: usize| row.get(i).unwrap_or("");
        let location = field(columns.location).to_string();

        AddressRecord {
            row_index,
            identifier: parse_identifier(field(columns.identifier)),
            registration_date: parse_registration_date(
                field(columns.registration_date),
                date_formats,
            ),
            latitude: parse_coordinate(field(columns.latitude)),
            longitude: parse_coordinate(field(columns.longitude)),
            postcode: extract_postcode(&location),
            location,
            validated: false,
        }
    }

    /// Both coordinates present
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

// ============================================================================
// COLUMN INDEX
// ============================================================================

/// Positions of the required address columns within a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex {
    pub identifier: usize,
    pub registration_date: usize,
    pub latitude: usize,
    pub longitude: usize,
    pub location: usize,
}

impl ColumnIndex {
    /// Resolve configured column names against a header row.
    ///
    /// Header names are matched exactly; the first occurrence wins.
    pub fn resolve(
        headers: &StringRecord,
        columns: &AddressColumns,
        file: &str,
    ) -> Result<Self, PipelineError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| PipelineError::MissingColumn {
                    file: file.to_string(),
                    column: name.to_string(),
                })
        };

        Ok(ColumnIndex {
            identifier: find(&columns.identifier)?,
            registration_date: find(&columns.registration_date)?,
            latitude: find(&columns.latitude)?,
            longitude: find(&columns.longitude)?,
            location: find(&columns.location)?,
        })
    }
}

// ============================================================================
// FIELD PARSERS
// ============================================================================

/// Integer identifier. `"7.0"` is accepted as 7, anything fractional or
/// non-numeric is missing.
pub fn parse_identifier(raw: &str) -> Option<i64> {
    let raw = raw.trim();

    if let Ok(id) = raw.parse::<i64>() {
        return Some(id);
    }

    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

/// Floating point coordinate. NaN and infinities count as missing.
pub fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Registration date, trying each chrono format in order.
///
/// Time components in the input are parsed and discarded.
pub fn parse_registration_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Postcode token from a free-text location.
///
/// With commas present the token is the trimmed last component, otherwise
/// the whole string as-is. No format checks and no case folding.
pub fn extract_postcode(location: &str) -> Option<String> {
    let token = match location.rsplit_once(',') {
        Some((_, last)) => last.trim(),
        None => location,
    };

    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
