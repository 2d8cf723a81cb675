//! Shared file plumbing for sheet input and report output.
//!
//! `-` stands for stdin when reading and stdout when writing. Text is decoded
//! and encoded with `encoding_rs`, UTF-8 unless a label is given.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use log::warn;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

/// `.tsv` files default to tab, everything else to comma.
pub fn resolve_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match extension(path).as_deref() {
        Some("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Ragged rows are accepted; missing trailing cells read as empty.
pub fn open_csv_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(reader))
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| {
            let (text, _, had_errors) = encoding.decode(field);
            if had_errors {
                Err(anyhow!("Failed to decode text with encoding {}", encoding.name()))
            } else {
                Ok(text.into_owned())
            }
        })
        .collect()
}

/// Writes UTF-8 `contents` to `path` (or stdout) in the requested encoding.
pub fn write_encoded(path: &Path, encoding: &'static Encoding, contents: &str) -> Result<()> {
    let bytes = if encoding == UTF_8 {
        contents.as_bytes().to_vec()
    } else {
        let (encoded, _, had_unmappable) = encoding.encode(contents);
        if had_unmappable {
            warn!(
                "Some characters are not representable in {} and were replaced in {path:?}",
                encoding.name()
            );
        }
        encoded.into_owned()
    };
    let mut writer: Box<dyn Write> = if is_dash(path) {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
        ))
    };
    writer
        .write_all(&bytes)
        .with_context(|| format!("Writing {path:?}"))?;
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}
