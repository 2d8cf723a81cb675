use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Validate spreadsheet rows against GraphQL model schemas",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate one sheet against a model and write records and failures
    Migrate(MigrateArgs),
    /// Run a YAML migration plan covering several sheets in order
    Plan(PlanArgs),
    /// Show how each column of a sheet resolves against a model
    Headers(HeadersArgs),
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Schema catalog (YAML) describing the models
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Model the sheet maps to
    #[arg(short, long)]
    pub model: String,
    /// Input sheet: CSV/TSV, or an xlsx/xls/xlsb/ods workbook
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Workbook sheet name (defaults to the model name)
    #[arg(long)]
    pub sheet: Option<String>,
    /// Lookup file (YAML or JSON) with references for related models
    #[arg(short = 'l', long = "lookup", action = clap::ArgAction::Append)]
    pub lookups: Vec<PathBuf>,
    /// Write successful records as a JSON array (`-` for stdout)
    #[arg(short, long)]
    pub records: Option<PathBuf>,
    /// Write one CSV line per field failure
    #[arg(short, long)]
    pub failures: Option<PathBuf>,
    /// Worker threads for row assembly (1 runs sequentially)
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,
    /// Delimiter for CSV input and the failures file (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of CSV input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Character encoding of the failures file (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Exit with an error when any row fails validation
    #[arg(long = "fail-on-error")]
    pub fail_on_error: bool,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Migration plan (YAML)
    #[arg(short, long)]
    pub plan: PathBuf,
    /// Override the plan's worker thread count
    #[arg(short, long)]
    pub jobs: Option<usize>,
    /// Exit with an error when any row of any sheet fails validation
    #[arg(long = "fail-on-error")]
    pub fail_on_error: bool,
}

#[derive(Debug, Args)]
pub struct HeadersArgs {
    /// Schema catalog (YAML) describing the models
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Model the sheet maps to
    #[arg(short, long)]
    pub model: String,
    /// Input sheet: CSV/TSV, or an xlsx/xls/xlsb/ods workbook
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Workbook sheet name (defaults to the model name)
    #[arg(long)]
    pub sheet: Option<String>,
    /// CSV delimiter character
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of CSV input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "pipe" | "|" => Ok(b'|'),
        "semicolon" | ";" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
