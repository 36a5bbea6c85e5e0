// 🚚 Pipeline Driver - load → match → write
//
// The address file is kept as raw rows so every original column reaches
// the output untouched. Normalized records only drive the matching and
// supply the two appended columns.

use crate::config::PipelineConfig;
use crate::matcher::{Matcher, ValidationSummary};
use crate::normalizer::{AddressRecord, ColumnIndex};
use crate::reference::load_reference;
use anyhow::{Context, Result};
use csv::{QuoteStyle, StringRecord, Terminator};
use std::fs;
use std::path::{Path, PathBuf};

pub const POSTCODE_COLUMN: &str = "Postcode";
pub const VALIDATED_COLUMN: &str = "validated";

// ============================================================================
// ADDRESS TABLE
// ============================================================================

/// The address list exactly as read: header plus raw rows in file order.
#[derive(Debug, Clone)]
pub struct AddressTable {
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
}

impl AddressTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Normalize every row.
    pub fn records(&self, columns: &ColumnIndex, date_formats: &[String]) -> Vec<AddressRecord> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| AddressRecord::from_row(i, row, columns, date_formats))
            .collect()
    }
}

/// Read the comma-delimited address list.
///
/// Rows may be ragged: short rows are padded with empty fields up to the
/// header width, long rows are kept whole.
pub fn load_address_table(path: &Path) -> Result<AddressTable> {
    let file = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open address list: {}", file))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", file))?
        .clone();

    let mut rows = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let mut row = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, file)
        })?;

        while row.len() < headers.len() {
            row.push_field("");
        }
        rows.push(row);
    }

    tracing::info!(rows = rows.len(), columns = headers.len(), "loaded address list from {}", file);

    Ok(AddressTable { headers, rows })
}

// ============================================================================
// OUTPUT
// ============================================================================

fn validated_label(validated: bool) -> &'static str {
    if validated {
        "True"
    } else {
        "False"
    }
}

/// Write the augmented table as fully quoted TSV.
///
/// The file is written next to the destination and renamed into place, so
/// the destination either holds a complete output or is left untouched.
pub fn write_output(
    path: &Path,
    table: &AddressTable,
    records: &[AddressRecord],
) -> Result<()> {
    anyhow::ensure!(
        table.len() == records.len(),
        "row count mismatch: {} input rows, {} validated records",
        table.len(),
        records.len()
    );

    let staging = staging_path(path);
    let written = write_tsv(&staging, table, records);
    if let Err(err) = written {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }

    if let Err(err) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(err)
            .with_context(|| format!("Failed to move output into place: {}", path.display()));
    }

    tracing::info!(rows = records.len(), "wrote {}", path.display());
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output".into());
    name.push(".partial");
    path.with_file_name(name)
}

fn write_tsv(path: &Path, table: &AddressTable, records: &[AddressRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;

    let mut header = table.headers.clone();
    header.push_field(POSTCODE_COLUMN);
    header.push_field(VALIDATED_COLUMN);
    writer.write_record(&header)?;

    for (row, record) in table.rows.iter().zip(records) {
        let mut out = row.clone();
        out.push_field(record.postcode.as_deref().unwrap_or(""));
        out.push_field(validated_label(record.validated));
        writer.write_record(&out)?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush output file: {}", path.display()))?;
    Ok(())
}

// ============================================================================
// RUN
// ============================================================================

/// Validate an address list against a postcode reference table.
pub fn run(
    address_path: &Path,
    reference_path: &Path,
    destination_path: &Path,
    config: &PipelineConfig,
) -> Result<ValidationSummary> {
    config.validate()?;

    let table = load_address_table(address_path)?;
    let columns = ColumnIndex::resolve(
        &table.headers,
        &config.columns,
        &address_path.display().to_string(),
    )?;

    let references = load_reference(reference_path)?;

    let records = table.records(&columns, &config.date_formats);
    let matcher = Matcher::with_tolerance(config.tolerance_meters);
    let (records, summary) = matcher.validate(records, &references);

    tracing::info!(
        total = summary.total,
        validated = summary.validated,
        rejected = summary.rejected(),
        "{}",
        summary.summary()
    );

    write_output(destination_path, &table, &records)?;

    Ok(summary)
}

/// Write the run summary as pretty JSON.
pub fn write_summary(path: &Path, summary: &ValidationSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write summary: {}", path.display()))?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
