//! Array parsing for list-typed fields.
//!
//! Detection order, first match wins:
//!
//! 1. a structural list cell is used as-is
//! 2. `[...]` text is read as a JSON array
//! 3. text containing `;` splits on `;`
//! 4. text containing `,` splits on `,`
//! 5. text with internal whitespace splits on whitespace runs
//! 6. anything else is a one-element array
//!
//! Tokens are trimmed and empty tokens dropped before coercion. An element
//! the coercer rejects is dropped and reported back, never failing the field.

use log::debug;

use crate::{
    coerce::clean_input,
    data::{CellValue, Value},
    failure::Rejection,
};

/// Result of parsing one array cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedArray {
    pub values: Vec<Value>,
    /// Elements dropped by the element coercer, with the reason.
    pub dropped: Vec<(CellValue, Rejection)>,
}

/// Splits a cell into its element tokens without coercing them.
pub fn split_tokens(cell: &CellValue) -> Vec<CellValue> {
    let tokens = match cell {
        CellValue::Empty => Vec::new(),
        CellValue::List(items) => items.clone(),
        CellValue::Text(text) => split_text(&clean_input(text)),
        scalar => vec![scalar.clone()],
    };
    tokens
        .into_iter()
        .filter_map(|token| match token {
            CellValue::Text(text) => {
                let trimmed = clean_input(&text);
                (!trimmed.is_empty()).then_some(CellValue::Text(trimmed))
            }
            other if other.is_blank() => None,
            other => Some(other),
        })
        .collect()
}

fn split_text(text: &str) -> Vec<CellValue> {
    let mut body = text;
    if let Some(inner) = text.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        match serde_json::from_str::<Vec<serde_json::Value>>(text) {
            Ok(items) => return items.into_iter().map(json_to_cell).collect(),
            Err(err) => {
                debug!("'{text}' is not a JSON array ({err}); falling back to delimiters");
                body = inner;
            }
        }
    }
    let parts: Vec<&str> = if body.contains(';') {
        body.split(';').collect()
    } else if body.contains(',') {
        body.split(',').collect()
    } else if body.trim().contains(char::is_whitespace) {
        body.split_whitespace().collect()
    } else {
        vec![body]
    };
    parts
        .into_iter()
        .map(|part| CellValue::Text(part.to_string()))
        .collect()
}

fn json_to_cell(item: serde_json::Value) -> CellValue {
    match item {
        serde_json::Value::Null => CellValue::Empty,
        serde_json::Value::Bool(flag) => CellValue::Bool(flag),
        serde_json::Value::Number(number) => number
            .as_f64()
            .map(CellValue::Number)
            .unwrap_or_else(|| CellValue::Text(number.to_string())),
        serde_json::Value::String(text) => CellValue::Text(text),
        nested => CellValue::Text(nested.to_string()),
    }
}

/// Splits `cell` and runs every surviving token through `coerce`.
pub fn parse_array<F>(cell: &CellValue, mut coerce: F) -> ParsedArray
where
    F: FnMut(&CellValue) -> Result<Option<Value>, Rejection>,
{
    let mut parsed = ParsedArray::default();
    for token in split_tokens(cell) {
        match coerce(&token) {
            Ok(Some(value)) => parsed.values.push(value),
            Ok(None) => {}
            Err(rejection) => {
                debug!(
                    "Dropping array element '{}': {}",
                    token.as_display(),
                    rejection.detail
                );
                parsed.dropped.push((token, rejection));
            }
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{coerce::coerce_scalar, schema::ScalarKind};

    fn strings(cell: CellValue) -> Vec<Value> {
        parse_array(&cell, |token| {
            coerce_scalar(token, ScalarKind::String, false)
        })
        .values
    }

    fn red_blue() -> Vec<Value> {
        vec![Value::String("red".into()), Value::String("blue".into())]
    }

    #[test]
    fn all_notations_yield_the_same_sequence() {
        for raw in [r#"["red","blue"]"#, "red; blue", "red, blue", "red blue"] {
            assert_eq!(strings(CellValue::Text(raw.into())), red_blue(), "{raw}");
        }
        assert_eq!(
            strings(CellValue::List(vec!["red".into(), "blue".into()])),
            red_blue()
        );
    }

    #[test]
    fn empty_tokens_are_dropped() {
        assert_eq!(strings(CellValue::Text("red, , blue".into())), red_blue());
        assert_eq!(strings(CellValue::Text(";;".into())), Vec::<Value>::new());
    }

    #[test]
    fn single_token_is_one_element() {
        assert_eq!(
            strings(CellValue::Text("red".into())),
            vec![Value::String("red".into())]
        );
    }

    #[test]
    fn semicolon_outranks_comma_and_whitespace() {
        assert_eq!(
            strings(CellValue::Text("New York, NY; Boston, MA".into())),
            vec![
                Value::String("New York, NY".into()),
                Value::String("Boston, MA".into())
            ]
        );
        assert_eq!(
            strings(CellValue::Text("New York, Boston".into())),
            vec![Value::String("New York".into()), Value::String("Boston".into())]
        );
    }

    #[test]
    fn malformed_json_falls_back_to_delimiters() {
        assert_eq!(strings(CellValue::Text("[red, blue]".into())), red_blue());
    }

    #[test]
    fn rejected_elements_are_reported_not_fatal() {
        let parsed = parse_array(&CellValue::Text("1, two, 3".into()), |token| {
            coerce_scalar(token, ScalarKind::Int, false)
        });
        assert_eq!(parsed.values, vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(parsed.dropped.len(), 1);
        assert_eq!(parsed.dropped[0].0, CellValue::Text("two".into()));
    }

    #[test]
    fn json_numbers_reach_the_coercer_as_numbers() {
        let parsed = parse_array(&CellValue::Text("[1, 2.0, \"3\"]".into()), |token| {
            coerce_scalar(token, ScalarKind::Int, false)
        });
        assert_eq!(parsed.values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }
}
