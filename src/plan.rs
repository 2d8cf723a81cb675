//! Multi-sheet migration plans.
//!
//! Sheets run in the order listed. A sheet with `key_field` feeds the values
//! of that field from its successful records into the lookup index, so later
//! sheets can reference them:
//!
//! ```yaml
//! schema: schema.yaml
//! lookups: [desks.yaml]
//! jobs: 4
//! sheets:
//!   - model: Reporter
//!     input: newsroom.xlsx
//!     sheet: Reporters
//!     key_field: name
//!     failures: out/reporter-failures.csv
//!   - model: Story
//!     input: newsroom.xlsx
//!     records: out/stories.json
//!     failures: out/story-failures.csv
//!     output_encoding: windows-1252
//! ```
//!
//! Relative paths resolve against the plan file's directory.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, ensure};
use serde::Deserialize;

use crate::{cli::parse_delimiter, lookup::LookupIndex, report::MigrationReport};

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    pub schema: PathBuf,
    pub lookups: Vec<PathBuf>,
    pub jobs: usize,
    pub sheets: Vec<SheetPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetPlan {
    pub model: String,
    pub input: PathBuf,
    pub sheet: Option<String>,
    pub key_field: Option<String>,
    pub records: Option<PathBuf>,
    pub failures: Option<PathBuf>,
    pub delimiter: Option<u8>,
    pub input_encoding: Option<String>,
    /// Encoding of the failures file, UTF-8 when unset.
    pub output_encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanDocument {
    schema: PathBuf,
    #[serde(default)]
    lookups: Vec<PathBuf>,
    #[serde(default = "default_jobs")]
    jobs: usize,
    sheets: Vec<SheetDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SheetDocument {
    model: String,
    input: PathBuf,
    #[serde(default)]
    sheet: Option<String>,
    #[serde(default)]
    key_field: Option<String>,
    #[serde(default)]
    records: Option<PathBuf>,
    #[serde(default)]
    failures: Option<PathBuf>,
    #[serde(default)]
    delimiter: Option<String>,
    #[serde(default)]
    input_encoding: Option<String>,
    #[serde(default)]
    output_encoding: Option<String>,
}

fn default_jobs() -> usize {
    1
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() || path == Path::new("-") {
        path
    } else {
        base.join(path)
    }
}

impl MigrationPlan {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening plan file {path:?}"))?;
        let document: PlanDocument = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing plan YAML {path:?}"))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_document(document, base).with_context(|| format!("Validating plan {path:?}"))
    }

    pub fn from_yaml_str(contents: &str, base: &Path) -> Result<Self> {
        let document: PlanDocument =
            serde_yaml::from_str(contents).context("Parsing plan YAML")?;
        Self::from_document(document, base)
    }

    fn from_document(document: PlanDocument, base: &Path) -> Result<Self> {
        ensure!(!document.sheets.is_empty(), "Plan lists no sheets");
        ensure!(document.jobs > 0, "Plan jobs must be at least 1");
        let sheets = document
            .sheets
            .into_iter()
            .map(|sheet| {
                let delimiter = sheet
                    .delimiter
                    .as_deref()
                    .map(parse_delimiter)
                    .transpose()
                    .map_err(|err| anyhow!("Sheet for {}: {err}", sheet.model))?;
                Ok(SheetPlan {
                    input: resolve(base, sheet.input),
                    records: sheet.records.map(|path| resolve(base, path)),
                    failures: sheet.failures.map(|path| resolve(base, path)),
                    model: sheet.model,
                    sheet: sheet.sheet,
                    key_field: sheet.key_field,
                    delimiter,
                    input_encoding: sheet.input_encoding,
                    output_encoding: sheet.output_encoding,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            schema: resolve(base, document.schema),
            lookups: document
                .lookups
                .into_iter()
                .map(|path| resolve(base, path))
                .collect(),
            jobs: document.jobs,
            sheets,
        })
    }
}

/// Adds every successful record's `key_field` value to the lookup set of the
/// report's model. The model is registered even when nothing is added, so
/// later references fail as unknown keys rather than as missing data.
pub fn register_keys(report: &MigrationReport, key_field: &str, lookup: &mut LookupIndex) -> usize {
    let model = lookup.register_model(report.model());
    let mut added = 0;
    for key in report
        .records()
        .filter_map(|record| record.fields.get(key_field))
        .filter_map(|value| value.as_key())
    {
        model.insert_id(key);
        added += 1;
    }
    added
}
