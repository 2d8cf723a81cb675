//! Field-level failure taxonomy shared by every coercer and the record assembler.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    RequiredFieldMissing,
    TypeCoercionError,
    InvalidEnumValue,
    ForeignKeyNotFound,
    /// The referenced model has no lookup set at all. Signals that the caller
    /// ran this sheet before the sheet it depends on.
    NoPrefetchedData,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::RequiredFieldMissing => "REQUIRED_FIELD_MISSING",
            FailureKind::TypeCoercionError => "TYPE_COERCION_ERROR",
            FailureKind::InvalidEnumValue => "INVALID_ENUM_VALUE",
            FailureKind::ForeignKeyNotFound => "FOREIGN_KEY_NOT_FOUND",
            FailureKind::NoPrefetchedData => "NO_PREFETCHED_DATA",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A coercer's verdict on one value, before it is tied to a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: FailureKind,
    pub detail: String,
}

impl Rejection {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn coercion(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::TypeCoercionError, detail)
    }

    pub fn into_failure(self, field: &str, raw: &CellValue) -> FieldFailure {
        FieldFailure {
            field: field.to_string(),
            kind: self.kind,
            raw_value: raw.as_display(),
            detail: self.detail,
        }
    }

    pub fn into_warning(self, field: &str, raw: &CellValue) -> FieldWarning {
        FieldWarning {
            field: field.to_string(),
            kind: self.kind,
            raw_value: raw.as_display(),
            detail: self.detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{field}: {kind} for '{raw_value}' ({detail})")]
pub struct FieldFailure {
    pub field: String,
    pub kind: FailureKind,
    pub raw_value: String,
    pub detail: String,
}

impl FieldFailure {
    pub fn missing(field: &str) -> Self {
        Self {
            field: field.to_string(),
            kind: FailureKind::RequiredFieldMissing,
            raw_value: String::new(),
            detail: "required value is absent or empty".to_string(),
        }
    }
}

/// A dropped array element. Recorded on the successful record, never fails it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWarning {
    pub field: String,
    pub kind: FailureKind,
    pub raw_value: String,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_as_taxonomy_codes() {
        let encoded = serde_json::to_string(&FailureKind::NoPrefetchedData).unwrap();
        assert_eq!(encoded, "\"NO_PREFETCHED_DATA\"");
        assert_eq!(FailureKind::InvalidEnumValue.to_string(), "INVALID_ENUM_VALUE");
    }

    #[test]
    fn rejection_keeps_raw_cell_text() {
        let failure = Rejection::coercion("not a number")
            .into_failure("age", &CellValue::Text("abc".into()));
        assert_eq!(failure.field, "age");
        assert_eq!(failure.raw_value, "abc");
        assert_eq!(failure.kind, FailureKind::TypeCoercionError);
        assert_eq!(
            failure.to_string(),
            "age: TYPE_COERCION_ERROR for 'abc' (not a number)"
        );
    }
}
