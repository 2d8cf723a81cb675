//! Report output: a failures CSV for people to correct and resubmit, and a
//! JSON array of successful records for the mutation step.

use std::path::Path;

use anyhow::{Context, Result};
use csv::QuoteStyle;
use encoding_rs::Encoding;
use log::info;

use crate::{io_utils::write_encoded, report::MigrationReport};

pub const FAILURE_COLUMNS: [&str; 5] = ["row", "field", "reason", "raw_value", "detail"];

/// Spreadsheet row number of a data row: 1-based, after the header row.
pub fn sheet_row_number(row_index: usize) -> usize {
    row_index + 2
}

/// One line per field failure, in row order.
pub fn render_failures_csv(report: &MigrationReport, delimiter: u8) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    writer
        .write_record(FAILURE_COLUMNS)
        .context("Writing failure header")?;
    for (row_index, failure) in report.field_failures() {
        writer
            .write_record([
                sheet_row_number(row_index).to_string().as_str(),
                failure.field.as_str(),
                failure.kind.code(),
                failure.raw_value.as_str(),
                failure.detail.as_str(),
            ])
            .with_context(|| format!("Writing failure for row {row_index}"))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| err.into_error())
        .context("Finishing failure CSV")?;
    String::from_utf8(bytes).context("Failure CSV is not valid UTF-8")
}

pub fn write_failures(
    report: &MigrationReport,
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<usize> {
    let contents = render_failures_csv(report, delimiter)?;
    write_encoded(path, encoding, &contents)?;
    let lines = report.field_failures().count();
    info!(
        "{}: wrote {lines} failure line(s) to {path:?}",
        report.model()
    );
    Ok(lines)
}

pub fn render_records_json(report: &MigrationReport) -> Result<String> {
    let records = report
        .records()
        .map(|record| record.to_json())
        .collect::<Vec<_>>();
    let mut rendered =
        serde_json::to_string_pretty(&records).context("Serializing records to JSON")?;
    rendered.push('\n');
    Ok(rendered)
}

pub fn write_records(report: &MigrationReport, path: &Path) -> Result<usize> {
    let contents = render_records_json(report)?;
    write_encoded(path, encoding_rs::UTF_8, &contents)?;
    let count = report.success_count();
    info!("{}: wrote {count} record(s) to {path:?}", report.model());
    Ok(count)
}
