//! Reads a sheet into raw rows.
//!
//! Workbooks (`.xlsx`, `.xlsm`, `.xls`, `.xlsb`, `.ods`) go through calamine;
//! anything else is read as delimited text. The first row is the header row.
//! Fully blank data rows are skipped but still consume a row index, so
//! indices always match the data row position in the source.

use std::{collections::HashSet, path::Path};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader, open_workbook_auto};
use chrono::{Duration, NaiveDate};
use encoding_rs::{Encoding, UTF_8};
use itertools::Itertools;
use log::{debug, warn};

use crate::{
    coerce::clean_input,
    data::{CellValue, RawRow},
    io_utils::{decode_record, extension, open_csv_reader, resolve_delimiter},
};

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 0-based position among the data rows.
    pub index: usize,
    pub cells: RawRow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Workbook sheet to read. Ignored for delimited text.
    pub sheet: Option<String>,
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            sheet: None,
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

pub fn is_workbook(path: &Path) -> bool {
    extension(path).is_some_and(|ext| WORKBOOK_EXTENSIONS.contains(&ext.as_str()))
}

pub fn read_sheet(path: &Path, options: &ReadOptions) -> Result<Sheet> {
    if is_workbook(path) {
        read_workbook_sheet(path, options.sheet.as_deref())
    } else {
        read_delimited(path, options)
    }
}

/// Header slots: `None` for columns that are skipped (blank or repeated).
fn header_slots(sheet: &str, raw: Vec<String>) -> (Vec<String>, Vec<Option<String>>) {
    let mut seen = HashSet::new();
    let mut headers = Vec::new();
    let slots = raw
        .into_iter()
        .enumerate()
        .map(|(position, header)| {
            let header = clean_input(&header);
            if header.is_empty() {
                debug!("{sheet}: column {} has no header and is skipped", position + 1);
                return None;
            }
            if !seen.insert(header.clone()) {
                warn!("{sheet}: duplicate header '{header}' in column {}; keeping the first", position + 1);
                return None;
            }
            headers.push(header.clone());
            Some(header)
        })
        .collect();
    (headers, slots)
}

fn build_row(slots: &[Option<String>], cells: impl IntoIterator<Item = CellValue>) -> RawRow {
    let mut row: RawRow = slots
        .iter()
        .flatten()
        .map(|header| (header.clone(), CellValue::Empty))
        .collect();
    for (slot, cell) in slots.iter().zip(cells) {
        if let Some(header) = slot {
            row.insert(header.clone(), cell);
        }
    }
    row
}

fn push_row(rows: &mut Vec<SheetRow>, index: usize, cells: RawRow) {
    if cells.values().all(CellValue::is_blank) {
        debug!("Skipping blank row {index}");
        return;
    }
    rows.push(SheetRow { index, cells });
}

fn read_delimited(path: &Path, options: &ReadOptions) -> Result<Sheet> {
    let delimiter = resolve_delimiter(path, options.delimiter);
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("stdin")
        .to_string();
    let mut reader = open_csv_reader(path, delimiter)?;
    let raw_headers = decode_record(
        reader
            .byte_headers()
            .with_context(|| format!("Reading headers from {path:?}"))?,
        options.encoding,
    )?;
    let (headers, slots) = header_slots(&name, raw_headers);

    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    let mut index = 0usize;
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("Reading row {} of {path:?}", index + 2))?
    {
        let cells = decode_record(&record, options.encoding)
            .with_context(|| format!("Decoding row {} of {path:?}", index + 2))?;
        push_row(&mut rows, index, build_row(&slots, cells.into_iter().map(CellValue::from)));
        index += 1;
    }
    debug!("Read {} data row(s) from {path:?}", rows.len());
    Ok(Sheet {
        name,
        headers,
        rows,
    })
}

fn read_workbook_sheet(path: &Path, sheet: Option<&str>) -> Result<Sheet> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Opening workbook {path:?}"))?;
    let names = workbook.sheet_names().to_vec();
    let name = match sheet {
        Some(wanted) => names
            .iter()
            .find(|candidate| candidate.as_str() == wanted)
            .or_else(|| names.iter().find(|candidate| candidate.eq_ignore_ascii_case(wanted)))
            .cloned()
            .ok_or_else(|| {
                anyhow!(
                    "Sheet '{wanted}' not found in {path:?}. Available sheets: {}",
                    names.iter().join(", ")
                )
            })?,
        None => names
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("Workbook {path:?} has no sheets"))?,
    };
    let range = workbook
        .worksheet_range(&name)
        .with_context(|| format!("Reading sheet '{name}' from {path:?}"))?;

    let mut grid = range.rows();
    let raw_headers: Vec<String> = grid
        .next()
        .map(|header_row| header_row.iter().map(|cell| convert_cell(cell).as_display()).collect())
        .unwrap_or_default();
    let (headers, slots) = header_slots(&name, raw_headers);
    let mut rows = Vec::new();
    for (index, cells) in grid.enumerate() {
        push_row(&mut rows, index, build_row(&slots, cells.iter().map(convert_cell)));
    }
    debug!("Read {} data row(s) from sheet '{name}' of {path:?}", rows.len());
    Ok(Sheet {
        name,
        headers,
        rows,
    })
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(text) => CellValue::from(text.as_str()),
        Data::Float(number) => CellValue::Number(*number),
        Data::Int(number) => CellValue::from(*number),
        Data::Bool(flag) => CellValue::Bool(*flag),
        Data::DateTime(serial) => excel_serial_to_text(serial.as_f64())
            .map(CellValue::Text)
            .unwrap_or(CellValue::Number(serial.as_f64())),
        Data::DateTimeIso(text) | Data::DurationIso(text) => CellValue::from(text.as_str()),
        Data::Error(err) => CellValue::Text(format!("{err}")),
    }
}

/// Excel day serials count from 1899-12-30. Serials below one day (midnight
/// included) render as a time, whole days as a date, anything else as an ISO
/// datetime.
pub fn excel_serial_to_text(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let moment = epoch.checked_add_signed(Duration::milliseconds(millis))?;
    let text = if serial < 1.0 {
        moment.format("%H:%M:%S").to_string()
    } else if serial.fract() == 0.0 {
        moment.format("%Y-%m-%d").to_string()
    } else {
        moment.format("%Y-%m-%dT%H:%M:%S").to_string()
    };
    Some(text)
}

/// Loads just the header row, for the `headers` command.
pub fn read_headers(path: &Path, options: &ReadOptions) -> Result<Vec<String>> {
    if is_workbook(path) {
        return Ok(read_workbook_sheet(path, options.sheet.as_deref())?.headers);
    }
    let delimiter = resolve_delimiter(path, options.delimiter);
    let mut reader = open_csv_reader(path, delimiter)?;
    let raw = decode_record(
        reader
            .byte_headers()
            .with_context(|| format!("Reading headers from {path:?}"))?,
        options.encoding,
    )?;
    Ok(header_slots("headers", raw).0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{coerce::coerce_scalar, data::Value, schema::ScalarKind};
    use chrono::NaiveTime;
    use std::fs;

    #[test]
    fn delimited_rows_keep_their_source_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Story.csv");
        fs::write(&path, "title,tags\nFirst,a;b\n,\nThird,\n").unwrap();
        let sheet = read_sheet(&path, &ReadOptions::default()).unwrap();
        assert_eq!(sheet.name, "Story");
        assert_eq!(sheet.headers, vec!["title", "tags"]);
        let indices: Vec<_> = sheet.rows.iter().map(|row| row.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(sheet.rows[1].cells["title"], CellValue::Text("Third".into()));
        assert_eq!(sheet.rows[1].cells["tags"], CellValue::Empty);
    }

    #[test]
    fn duplicate_and_blank_headers_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dupes.tsv");
        fs::write(&path, "title\t\ttitle\tnotes\nA\tx\tB\tn\n").unwrap();
        let sheet = read_sheet(&path, &ReadOptions::default()).unwrap();
        assert_eq!(sheet.headers, vec!["title", "notes"]);
        assert_eq!(sheet.rows[0].cells.len(), 2);
        assert_eq!(sheet.rows[0].cells["title"], CellValue::Text("A".into()));
    }

    #[test]
    fn ragged_rows_pad_with_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.csv");
        fs::write(&path, "a,b,c\n1\n").unwrap();
        let sheet = read_sheet(&path, &ReadOptions::default()).unwrap();
        assert_eq!(sheet.rows[0].cells["c"], CellValue::Empty);
    }

    #[test]
    fn latin1_input_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        fs::write(&path, b"city\nM\xfcnchen\n").unwrap();
        let options = ReadOptions {
            encoding: encoding_rs::WINDOWS_1252,
            ..ReadOptions::default()
        };
        let sheet = read_sheet(&path, &options).unwrap();
        assert_eq!(sheet.rows[0].cells["city"], CellValue::Text("München".into()));
    }

    #[test]
    fn excel_serials_render_as_iso_text() {
        assert_eq!(excel_serial_to_text(45092.0).as_deref(), Some("2023-06-15"));
        assert_eq!(excel_serial_to_text(0.5).as_deref(), Some("12:00:00"));
        assert_eq!(
            excel_serial_to_text(45092.75).as_deref(),
            Some("2023-06-15T18:00:00")
        );
        assert_eq!(excel_serial_to_text(f64::NAN), None);
    }

    #[test]
    fn midnight_time_cells_coerce_as_times() {
        let text = excel_serial_to_text(0.0).unwrap();
        assert_eq!(text, "00:00:00");
        let coerced = coerce_scalar(&CellValue::Text(text), ScalarKind::Time, false).unwrap();
        assert_eq!(coerced, Some(Value::Time(NaiveTime::MIN)));
    }

    #[test]
    fn workbook_extensions_are_detected() {
        assert!(is_workbook(Path::new("data/Stories.XLSX")));
        assert!(is_workbook(Path::new("legacy.ods")));
        assert!(!is_workbook(Path::new("stories.csv")));
    }
}
