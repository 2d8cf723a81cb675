use std::collections::BTreeSet;

use itertools::Itertools;

use crate::{
    coerce::clean_input,
    data::{CellValue, Value},
    failure::{FailureKind, Rejection},
};

/// `in progress` -> `IN_PROGRESS`. Canonical symbols come back unchanged.
pub fn normalize_enum_token(raw: &str) -> String {
    clean_input(raw).split_whitespace().join("_").to_uppercase()
}

pub fn coerce_enum(cell: &CellValue, values: &BTreeSet<String>) -> Result<Option<Value>, Rejection> {
    if cell.is_blank() {
        return Ok(None);
    }
    let Some(text) = cell.as_text() else {
        return Err(Rejection::new(
            FailureKind::InvalidEnumValue,
            "expected a single enum symbol, found a list",
        ));
    };
    let symbol = normalize_enum_token(&text);
    if values.contains(&symbol) {
        Ok(Some(Value::Enum(symbol)))
    } else {
        Err(Rejection::new(
            FailureKind::InvalidEnumValue,
            format!("'{symbol}' is not one of {}", values.iter().join(", ")),
        ))
    }
}
