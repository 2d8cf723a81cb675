//! Foreign key lookup sets and reference resolution.
//!
//! A [`LookupIndex`] holds, per related model, the references a sheet may use.
//! An entry is either a bare id, which resolves to itself, or a human-readable
//! key (typically the related model's primary field) mapped to the id.
//!
//! Lookup files are YAML or JSON, picked by extension:
//!
//! ```yaml
//! Reporter:
//!   - reporter-1                       # bare id
//!   - { key: John Doe, id: reporter-2 }
//! Desk:
//!   Politics: desk-1                   # key -> id map
//! ```

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    coerce::clean_input,
    data::{CellValue, Value},
    failure::{FailureKind, Rejection},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelLookup {
    keys: BTreeMap<String, String>,
}

impl ModelLookup {
    pub fn insert_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.keys.insert(id.clone(), id);
    }

    /// Maps `key` to `id`. The id itself also resolves.
    pub fn insert_key(&mut self, key: impl Into<String>, id: impl Into<String>) {
        let id = id.into();
        self.keys.entry(id.clone()).or_insert_with(|| id.clone());
        self.keys.insert(key.into(), id);
    }

    pub fn resolve(&self, reference: &str) -> Option<&str> {
        self.keys.get(reference).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupIndex {
    models: BTreeMap<String, ModelLookup>,
}

impl LookupIndex {
    /// Registers `model` with an empty set so references to it fail as
    /// missing ids rather than as missing prefetched data.
    pub fn register_model(&mut self, model: &str) -> &mut ModelLookup {
        self.models.entry(model.to_string()).or_default()
    }

    pub fn model(&self, model: &str) -> Option<&ModelLookup> {
        self.models.get(model)
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn insert_id(&mut self, model: &str, id: impl Into<String>) {
        self.register_model(model).insert_id(id);
    }

    pub fn insert_key(&mut self, model: &str, key: impl Into<String>, id: impl Into<String>) {
        self.register_model(model).insert_key(key, id);
    }

    pub fn merge(&mut self, other: LookupIndex) {
        for (model, lookup) in other.models {
            self.register_model(&model).keys.extend(lookup.keys);
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let document: BTreeMap<String, LookupDocument> =
            serde_yaml::from_str(contents).context("Parsing lookup YAML")?;
        Ok(Self::from_documents(document))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening lookup file {path:?}"))?;
        let reader = BufReader::new(file);
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let document: BTreeMap<String, LookupDocument> = if is_json {
            serde_json::from_reader(reader)
                .with_context(|| format!("Parsing lookup JSON {path:?}"))?
        } else {
            serde_yaml::from_reader(reader)
                .with_context(|| format!("Parsing lookup YAML {path:?}"))?
        };
        Ok(Self::from_documents(document))
    }

    fn from_documents(documents: BTreeMap<String, LookupDocument>) -> Self {
        let mut index = LookupIndex::default();
        for (model, document) in documents {
            let lookup = index.register_model(&model);
            match document {
                LookupDocument::Entries(entries) => {
                    for entry in entries {
                        match entry {
                            LookupEntry::Id(id) => lookup.insert_id(scalar_text(id)),
                            LookupEntry::Pair { key, id } => {
                                lookup.insert_key(scalar_text(key), scalar_text(id))
                            }
                        }
                    }
                }
                LookupDocument::Keys(keys) => {
                    for (key, id) in keys {
                        lookup.insert_key(key, scalar_text(id));
                    }
                }
            }
        }
        index
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LookupDocument {
    Entries(Vec<LookupEntry>),
    Keys(BTreeMap<String, LookupScalar>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LookupEntry {
    Id(LookupScalar),
    Pair { key: LookupScalar, id: LookupScalar },
}

/// Ids are sometimes numeric in exported data.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LookupScalar {
    Text(String),
    Integer(i64),
}

fn scalar_text(value: LookupScalar) -> String {
    match value {
        LookupScalar::Text(text) => text,
        LookupScalar::Integer(number) => number.to_string(),
    }
}

/// Resolves a reference cell against the related model's lookup set.
pub fn resolve_reference(
    cell: &CellValue,
    related_model: &str,
    index: &LookupIndex,
) -> Result<Option<Value>, Rejection> {
    if cell.is_blank() {
        return Ok(None);
    }
    let Some(lookup) = index.model(related_model) else {
        return Err(Rejection::new(
            FailureKind::NoPrefetchedData,
            format!("no lookup data loaded for {related_model}"),
        ));
    };
    let Some(text) = cell.as_text() else {
        return Err(Rejection::coercion(format!(
            "expected a single {related_model} reference, found a list"
        )));
    };
    let reference = clean_input(&text);
    lookup
        .resolve(&reference)
        .map(|id| Some(Value::Reference(id.to_string())))
        .ok_or_else(|| {
            Rejection::new(
                FailureKind::ForeignKeyNotFound,
                format!("'{reference}' is not a known {related_model}"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporters() -> LookupIndex {
        let mut index = LookupIndex::default();
        index.insert_id("Reporter", "reporter_1");
        index.insert_id("Reporter", "reporter_2");
        index.insert_key("Reporter", "John Doe", "reporter_1");
        index
    }

    #[test]
    fn known_ids_and_keys_resolve() {
        let index = reporters();
        assert_eq!(
            resolve_reference(&"reporter_1".into(), "Reporter", &index).unwrap(),
            Some(Value::Reference("reporter_1".into()))
        );
        assert_eq!(
            resolve_reference(&" John Doe ".into(), "Reporter", &index).unwrap(),
            Some(Value::Reference("reporter_1".into()))
        );
    }

    #[test]
    fn ids_from_key_pairs_resolve_directly() {
        let index =
            LookupIndex::from_yaml_str("Reporter:\n  - { key: John Doe, id: reporter-2 }\n").unwrap();
        assert_eq!(
            resolve_reference(&"reporter-2".into(), "Reporter", &index).unwrap(),
            Some(Value::Reference("reporter-2".into()))
        );
        assert_eq!(
            resolve_reference(&"John Doe".into(), "Reporter", &index).unwrap(),
            Some(Value::Reference("reporter-2".into()))
        );
    }

    #[test]
    fn unknown_reference_is_not_found() {
        let err = resolve_reference(&"reporter_99".into(), "Reporter", &reporters()).unwrap_err();
        assert_eq!(err.kind, FailureKind::ForeignKeyNotFound);
    }

    #[test]
    fn unloaded_model_reports_missing_prefetch() {
        let err = resolve_reference(&"desk-1".into(), "Desk", &reporters()).unwrap_err();
        assert_eq!(err.kind, FailureKind::NoPrefetchedData);
    }

    #[test]
    fn registered_but_empty_model_reports_not_found() {
        let mut index = reporters();
        index.register_model("Desk");
        let err = resolve_reference(&"desk-1".into(), "Desk", &index).unwrap_err();
        assert_eq!(err.kind, FailureKind::ForeignKeyNotFound);
    }

    #[test]
    fn empty_reference_is_no_reference() {
        assert_eq!(
            resolve_reference(&CellValue::Empty, "Desk", &reporters()).unwrap(),
            None
        );
    }

    #[test]
    fn numeric_cells_match_numeric_ids() {
        let mut index = LookupIndex::default();
        index.insert_id("Edition", "42");
        assert_eq!(
            resolve_reference(&CellValue::Number(42.0), "Edition", &index).unwrap(),
            Some(Value::Reference("42".into()))
        );
    }

    #[test]
    fn yaml_accepts_lists_pairs_and_maps() {
        let index = LookupIndex::from_yaml_str(
            r#"
Reporter:
  - reporter-1
  - { key: John Doe, id: reporter-2 }
  - 7
Desk:
  Politics: desk-1
Empty: []
"#,
        )
        .unwrap();
        let reporter = index.model("Reporter").unwrap();
        assert_eq!(reporter.resolve("reporter-1"), Some("reporter-1"));
        assert_eq!(reporter.resolve("John Doe"), Some("reporter-2"));
        assert_eq!(reporter.resolve("7"), Some("7"));
        assert_eq!(reporter.resolve("reporter-2"), Some("reporter-2"));
        let desk = index.model("Desk").unwrap();
        assert_eq!(desk.resolve("Politics"), Some("desk-1"));
        assert_eq!(desk.resolve("desk-1"), Some("desk-1"));
        assert!(index.has_model("Empty"));
        assert!(index.model("Empty").unwrap().is_empty());
    }

    #[test]
    fn merge_unions_model_sets() {
        let mut index = reporters();
        let mut other = LookupIndex::default();
        other.insert_id("Reporter", "reporter_3");
        other.insert_id("Desk", "desk-1");
        index.merge(other);
        assert_eq!(index.model("Reporter").unwrap().len(), 4);
        assert!(index.has_model("Desk"));
    }
}
