//! Reassembles embedded objects from flattened `parent.child` columns.
//!
//! Each sub-field cell holds one token per instance, separated by ` - `:
//!
//! ```text
//! address.street = "123 Main St - 456 Oak Ave"
//! address.city   = "New York - Boston"
//! address.zip    = "10001"
//! ```
//!
//! The instance count is the largest token count across the sub-field
//! columns. A column holding a single token broadcasts it to every instance;
//! a column with several tokens but fewer than the instance count leaves the
//! trailing instances without a value. Any failing instance fails the whole
//! field.

use std::collections::BTreeMap;

use crate::{
    coerce::clean_input,
    data::{CellValue, Value},
    failure::{FieldFailure, FieldWarning, Rejection},
    lookup::LookupIndex,
    record::coerce_value,
    schema::{CompositeSchema, FieldSchema},
};

pub const INSTANCE_SEPARATOR: &str = " - ";

static EMPTY_TOKEN: CellValue = CellValue::Empty;

/// Per-instance tokens of one sub-field cell. Empty tokens keep their slot.
pub fn split_instances(cell: &CellValue) -> Vec<CellValue> {
    match cell {
        CellValue::Empty => Vec::new(),
        CellValue::Text(text) => {
            let cleaned = clean_input(text);
            if cleaned.is_empty() {
                return Vec::new();
            }
            cleaned
                .split(INSTANCE_SEPARATOR)
                .map(|token| CellValue::from(clean_input(token)))
                .collect()
        }
        CellValue::List(items) => items.clone(),
        scalar => vec![scalar.clone()],
    }
}

fn instance_path(parent: &str, list: bool, index: usize, child: &str) -> String {
    if list {
        format!("{parent}[{index}].{child}")
    } else {
        format!("{parent}.{child}")
    }
}

/// `cells` holds one entry per declared sub-field, `None` when the sheet has
/// no column for it. Returns `Ok(None)` when every sub-field is empty.
pub fn assemble_composite(
    field: &FieldSchema,
    composite: &CompositeSchema,
    cells: &[Option<&CellValue>],
    lookup: &LookupIndex,
    warnings: &mut Vec<FieldWarning>,
) -> Result<Option<Value>, Vec<FieldFailure>> {
    let tokens: Vec<Option<Vec<CellValue>>> = composite
        .fields
        .iter()
        .enumerate()
        .map(|(idx, _)| cells.get(idx).copied().flatten().map(split_instances))
        .collect();
    let count = tokens
        .iter()
        .map(|column| column.as_ref().map_or(0, Vec::len))
        .max()
        .unwrap_or(0);
    if count == 0 {
        return Ok(None);
    }
    if !composite.list && count > 1 {
        let raw = cells
            .iter()
            .flatten()
            .find(|cell| split_instances(cell).len() > 1)
            .map(|cell| (*cell).clone())
            .unwrap_or_default();
        return Err(vec![
            Rejection::coercion(format!(
                "expected a single {} instance, found {count}",
                field.name
            ))
            .into_failure(&field.name, &raw),
        ]);
    }

    let mut failures = Vec::new();
    let mut instances = Vec::with_capacity(count);
    for index in 0..count {
        let mut object = BTreeMap::new();
        for (sub, column) in composite.fields.iter().zip(&tokens) {
            let path = instance_path(&field.name, composite.list, index, &sub.name);
            let Some(column) = column else {
                if sub.required {
                    failures.push(FieldFailure::missing(&path));
                }
                continue;
            };
            let token = match column.len() {
                1 => &column[0],
                _ => column.get(index).unwrap_or(&EMPTY_TOKEN),
            };
            match coerce_value(sub, &path, token, lookup, warnings) {
                Ok(Some(value)) => {
                    object.insert(sub.name.clone(), value);
                }
                Ok(None) => {}
                Err(failure) => failures.push(failure),
            }
        }
        instances.push(Value::Object(object));
    }

    if !failures.is_empty() {
        return Err(failures);
    }
    if composite.list {
        Ok(Some(Value::List(instances)))
    } else {
        Ok(instances.into_iter().next())
    }
}
