//! Record assembly: one raw row in, one all-or-nothing outcome out.
//!
//! Every declared field is visited even after an earlier field fails, so a
//! single [`RecordFailure`] lists every problem in the row. Dropped array
//! elements are carried as warnings on the successful [`Record`].

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    array::parse_array,
    coerce::coerce_scalar,
    composite::assemble_composite,
    data::{CellValue, RawRow, Value},
    enumeration::coerce_enum,
    failure::{FieldFailure, FieldWarning, Rejection},
    header::HeaderMap,
    lookup::{LookupIndex, resolve_reference},
    schema::{ElementKind, FieldKind, FieldSchema, ModelSchema},
};

static EMPTY_CELL: CellValue = CellValue::Empty;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub row_index: usize,
    pub fields: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FieldWarning>,
}

impl Record {
    /// The mutation payload: canonical field name to rendered value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub row_index: usize,
    pub failures: Vec<FieldFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Success(Record),
    Failure(RecordFailure),
}

impl RecordOutcome {
    pub fn row_index(&self) -> usize {
        match self {
            RecordOutcome::Success(record) => record.row_index,
            RecordOutcome::Failure(failure) => failure.row_index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RecordOutcome::Success(_))
    }

    pub fn record(&self) -> Option<&Record> {
        match self {
            RecordOutcome::Success(record) => Some(record),
            RecordOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RecordFailure> {
        match self {
            RecordOutcome::Failure(failure) => Some(failure),
            RecordOutcome::Success(_) => None,
        }
    }
}

/// Coerces one cell against a non-composite field.
///
/// Blank cells are absent (`Ok(None)`), or `REQUIRED_FIELD_MISSING` when the
/// field is required. Array fields never fail: a blank cell is an empty list
/// and rejected elements become warnings under `path`.
pub fn coerce_value(
    field: &FieldSchema,
    path: &str,
    cell: &CellValue,
    lookup: &LookupIndex,
    warnings: &mut Vec<FieldWarning>,
) -> Result<Option<Value>, FieldFailure> {
    let coerced = match &field.kind {
        FieldKind::Array(element) => {
            let parsed = parse_array(cell, |token| match element {
                ElementKind::Scalar(kind) => coerce_scalar(token, *kind, false),
                ElementKind::Enum(values) => coerce_enum(token, values),
            });
            warnings.extend(
                parsed
                    .dropped
                    .into_iter()
                    .map(|(token, rejection)| rejection.into_warning(path, &token)),
            );
            return Ok(Some(Value::List(parsed.values)));
        }
        _ if cell.is_blank() => {
            return if field.required {
                Err(FieldFailure::missing(path))
            } else {
                Ok(None)
            };
        }
        FieldKind::Scalar(kind) => coerce_scalar(cell, *kind, field.permissive),
        FieldKind::Enum(values) => coerce_enum(cell, values),
        FieldKind::ForeignKey(model) => resolve_reference(cell, model, lookup),
        FieldKind::Custom(_) => Err(Rejection::coercion(
            "composite fields are read from parent.child columns",
        )),
    };
    coerced.map_err(|rejection| rejection.into_failure(path, cell))
}

/// Assembles records for one sheet. Header resolution happens once in
/// [`RecordAssembler::new`]; [`RecordAssembler::assemble`] is pure and may be
/// called from several threads at once.
#[derive(Debug, Clone)]
pub struct RecordAssembler<'a> {
    model: &'a ModelSchema,
    headers: HeaderMap,
}

impl<'a> RecordAssembler<'a> {
    pub fn new<S: AsRef<str>>(model: &'a ModelSchema, headers: &[S]) -> Self {
        Self {
            model,
            headers: HeaderMap::build(model, headers),
        }
    }

    pub fn model(&self) -> &ModelSchema {
        self.model
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn assemble(&self, row_index: usize, row: &RawRow, lookup: &LookupIndex) -> RecordOutcome {
        let mut fields = BTreeMap::new();
        let mut failures = Vec::new();
        let mut warnings = Vec::new();

        for (idx, field) in self.model.fields.iter().enumerate() {
            let Some(columns) = self.headers.columns(idx).filter(|columns| columns.is_present())
            else {
                if field.required {
                    failures.push(FieldFailure::missing(&field.name));
                }
                continue;
            };
            let coerced = match &field.kind {
                FieldKind::Custom(composite) => {
                    let cells = (0..composite.fields.len())
                        .map(|sub| columns.sub_field_cell(sub, row))
                        .collect::<Vec<_>>();
                    match assemble_composite(field, composite, &cells, lookup, &mut warnings) {
                        Ok(None) if field.required => Err(vec![FieldFailure::missing(&field.name)]),
                        other => other,
                    }
                }
                _ => {
                    let cell = columns.direct_cell(row).unwrap_or(&EMPTY_CELL);
                    coerce_value(field, &field.name, cell, lookup, &mut warnings)
                        .map_err(|failure| vec![failure])
                }
            };
            match coerced {
                Ok(Some(value)) => {
                    fields.insert(field.name.clone(), value);
                }
                Ok(None) => {}
                Err(field_failures) => failures.extend(field_failures),
            }
        }

        if failures.is_empty() {
            RecordOutcome::Success(Record {
                row_index,
                fields,
                warnings,
            })
        } else {
            RecordOutcome::Failure(RecordFailure {
                row_index,
                failures,
            })
        }
    }
}

/// One-off assembly that resolves headers from the row's own keys.
pub fn assemble_row(
    model: &ModelSchema,
    row_index: usize,
    row: &RawRow,
    lookup: &LookupIndex,
) -> RecordOutcome {
    let headers = row.keys().collect::<Vec<_>>();
    RecordAssembler::new(model, &headers).assemble(row_index, row, lookup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{failure::FailureKind, schema::ScalarKind};

    fn model() -> ModelSchema {
        ModelSchema::new(
            "Story",
            vec![
                FieldSchema::scalar("title", ScalarKind::String).required(),
                FieldSchema::scalar("wordCount", ScalarKind::Int),
                FieldSchema::new("tags", FieldKind::Array(ElementKind::Scalar(ScalarKind::Int)))
                    .required(),
                FieldSchema::new("status", FieldKind::enumeration(["DRAFT", "PUBLISHED"])),
            ],
        )
        .unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(header, value)| (header.to_string(), CellValue::from(*value)))
            .collect()
    }

    #[test]
    fn successful_row_keeps_coerced_fields_and_warnings() {
        let outcome = assemble_row(
            &model(),
            3,
            &row(&[("Title", " Hello "), ("word_count", "2-2"), ("tags", "1, x, 3")]),
            &LookupIndex::default(),
        );
        let record = outcome.record().unwrap();
        assert_eq!(record.row_index, 3);
        assert_eq!(record.fields["title"], Value::String("Hello".into()));
        assert_eq!(record.fields["wordCount"], Value::Int(4));
        assert_eq!(
            record.fields["tags"],
            Value::List(vec![Value::Int(1), Value::Int(3)])
        );
        assert!(!record.fields.contains_key("status"));
        assert_eq!(record.warnings.len(), 1);
        assert_eq!(record.warnings[0].field, "tags");
        assert_eq!(record.warnings[0].raw_value, "x");
    }

    #[test]
    fn failures_are_aggregated_in_declaration_order() {
        let outcome = assemble_row(
            &model(),
            0,
            &row(&[("title", ""), ("wordCount", "many"), ("tags", ""), ("status", "lost")]),
            &LookupIndex::default(),
        );
        let failure = outcome.failure().unwrap();
        let kinds: Vec<_> = failure
            .failures
            .iter()
            .map(|failure| (failure.field.as_str(), failure.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("title", FailureKind::RequiredFieldMissing),
                ("wordCount", FailureKind::TypeCoercionError),
                ("status", FailureKind::InvalidEnumValue),
            ]
        );
    }

    #[test]
    fn required_array_only_needs_its_column() {
        let missing = assemble_row(
            &model(),
            0,
            &row(&[("title", "t")]),
            &LookupIndex::default(),
        );
        assert_eq!(
            missing.failure().unwrap().failures,
            vec![FieldFailure::missing("tags")]
        );
        let empty = assemble_row(
            &model(),
            0,
            &row(&[("title", "t"), ("tags", "")]),
            &LookupIndex::default(),
        );
        assert_eq!(empty.record().unwrap().fields["tags"], Value::List(vec![]));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = assemble_row(
            &model(),
            1,
            &row(&[("title", "t"), ("tags", "1")]),
            &LookupIndex::default(),
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["fields"]["tags"], serde_json::json!([1]));
    }
}
