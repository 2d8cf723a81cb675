//! Input cleaning and the scalar coercers.
//!
//! Every coercer maps a raw [`CellValue`] to `Ok(Some(value))`, `Ok(None)` when
//! the cell is absent after cleaning, or a [`Rejection`].

use std::sync::LazyLock;

use regex::Regex;

use crate::{
    data::{CellValue, Value, parse_naive_date, parse_naive_datetime, parse_naive_time},
    failure::Rejection,
    schema::ScalarKind,
};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").expect("email pattern compiles")
});

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^\s/?#]+([/?#]\S*)?$").expect("url pattern compiles")
});

const TRUE_TOKENS: &[&str] = &["true", "1", "yes", "y", "v"];
const FALSE_TOKENS: &[&str] = &["false", "0", "no", "n", "x"];

/// Unicode format (Cf) code points: zero-width spaces and joiners, soft
/// hyphen, bidi marks and embeddings, invisible operators, BOM, tag characters.
fn is_format_char(ch: char) -> bool {
    matches!(
        ch as u32,
        0x00AD
            | 0x0600..=0x0605
            | 0x061C
            | 0x06DD
            | 0x070F
            | 0x0890..=0x0891
            | 0x08E2
            | 0x180E
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x2064
            | 0x2066..=0x206F
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0x110BD
            | 0x110CD
            | 0x13430..=0x1343F
            | 0x1BCA0..=0x1BCA3
            | 0x1D173..=0x1D17A
            | 0xE0001
            | 0xE0020..=0xE007F
    )
}

/// Strips control and format characters (keeping `\n`, `\t`, `\r`) and trims.
/// Every other code point, emoji and non-Latin scripts included, is kept.
pub fn clean_input(raw: &str) -> String {
    let stripped = raw
        .chars()
        .filter(|ch| matches!(ch, '\n' | '\t' | '\r') || !(ch.is_control() || is_format_char(*ch)))
        .collect::<String>();
    stripped.trim().to_string()
}

/// Cleaned text of a scalar cell, `None` when nothing is left.
fn cleaned_text(cell: &CellValue) -> Option<String> {
    let text = cell.as_text()?;
    let cleaned = clean_input(&text);
    (!cleaned.is_empty()).then_some(cleaned)
}

pub fn coerce_scalar(
    cell: &CellValue,
    kind: ScalarKind,
    permissive: bool,
) -> Result<Option<Value>, Rejection> {
    if cell.is_blank() {
        return Ok(None);
    }
    if let CellValue::List(items) = cell {
        return match kind {
            ScalarKind::Json => Ok(Some(Value::Json(list_to_json(items)))),
            _ => Err(Rejection::coercion(format!(
                "expected a single {kind} value, found a list"
            ))),
        };
    }
    let coerced = match kind {
        ScalarKind::String => cleaned_text(cell).map(Value::String),
        ScalarKind::Int => Some(Value::Int(coerce_int(cell)?)),
        ScalarKind::Float => Some(Value::Float(coerce_float(cell)?)),
        ScalarKind::Boolean => Some(Value::Boolean(coerce_bool(cell)?)),
        ScalarKind::Date => {
            let text = require_text(cell, kind)?;
            let parsed = parse_naive_date(&text)
                .map_err(|_| Rejection::coercion(format!("'{text}' is not a recognised date")))?;
            Some(Value::Date(parsed))
        }
        ScalarKind::DateTime => {
            let text = require_text(cell, kind)?;
            let parsed = parse_naive_datetime(&text).map_err(|_| {
                Rejection::coercion(format!("'{text}' is not a recognised datetime"))
            })?;
            Some(Value::DateTime(parsed))
        }
        ScalarKind::Time => {
            let text = require_text(cell, kind)?;
            let parsed = parse_naive_time(&text)
                .map_err(|_| Rejection::coercion(format!("'{text}' is not a recognised time")))?;
            Some(Value::Time(parsed))
        }
        ScalarKind::Email => {
            let text = require_text(cell, kind)?;
            if !EMAIL_PATTERN.is_match(&text) {
                return Err(Rejection::coercion(format!("'{text}' is not an email address")));
            }
            Some(Value::Email(text))
        }
        ScalarKind::Url => {
            let text = require_text(cell, kind)?;
            if !URL_PATTERN.is_match(&text) {
                return Err(Rejection::coercion(format!(
                    "'{text}' is not a URL with a scheme and host"
                )));
            }
            Some(Value::Url(text))
        }
        ScalarKind::Json => Some(Value::Json(coerce_json(cell, permissive)?)),
    };
    Ok(coerced)
}

fn require_text(cell: &CellValue, kind: ScalarKind) -> Result<String, Rejection> {
    match cell {
        CellValue::Text(_) => {
            cleaned_text(cell).ok_or_else(|| Rejection::coercion(format!("empty {kind} value")))
        }
        other => Err(Rejection::coercion(format!(
            "expected {kind} text, found '{}'",
            other.as_display()
        ))),
    }
}

fn coerce_int(cell: &CellValue) -> Result<i64, Rejection> {
    match cell {
        CellValue::Number(number) => integral(*number)
            .ok_or_else(|| Rejection::coercion(format!("{number} is not a whole number"))),
        CellValue::Bool(_) => Err(Rejection::coercion("expected an integer, found a boolean")),
        _ => {
            let text = cleaned_text(cell).unwrap_or_default();
            parse_int_text(&text)
        }
    }
}

fn integral(number: f64) -> Option<i64> {
    (number.is_finite() && number.fract() == 0.0 && number.abs() < 9.0e18).then_some(number as i64)
}

/// `<digits>-<digits>` is the sum of both sides; legacy sheets use it for
/// counts split across two tallies.
fn dash_sum(text: &str) -> Option<Result<i64, Rejection>> {
    let (left, right) = text.split_once('-')?;
    let is_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(left) || !is_digits(right) {
        return None;
    }
    let sum = left
        .parse::<i64>()
        .ok()
        .zip(right.parse::<i64>().ok())
        .and_then(|(a, b)| a.checked_add(b));
    Some(sum.ok_or_else(|| Rejection::coercion(format!("'{text}' overflows an integer"))))
}

fn parse_int_text(text: &str) -> Result<i64, Rejection> {
    if let Some(sum) = dash_sum(text) {
        return sum;
    }
    if let Ok(parsed) = text.parse::<i64>() {
        return Ok(parsed);
    }
    text.parse::<f64>()
        .ok()
        .and_then(integral)
        .ok_or_else(|| Rejection::coercion(format!("'{text}' is not an integer")))
}

fn coerce_float(cell: &CellValue) -> Result<f64, Rejection> {
    let parsed = match cell {
        CellValue::Number(number) => Some(*number),
        CellValue::Bool(_) => None,
        _ => cleaned_text(cell).and_then(|text| text.parse::<f64>().ok()),
    };
    parsed
        .filter(|number| number.is_finite())
        .ok_or_else(|| Rejection::coercion(format!("'{}' is not a number", cell.as_display())))
}

fn coerce_bool(cell: &CellValue) -> Result<bool, Rejection> {
    match cell {
        CellValue::Bool(flag) => Ok(*flag),
        CellValue::Number(number) if *number == 1.0 => Ok(true),
        CellValue::Number(number) if *number == 0.0 => Ok(false),
        _ => {
            let lowered = cleaned_text(cell).unwrap_or_default().to_lowercase();
            if TRUE_TOKENS.contains(&lowered.as_str()) {
                Ok(true)
            } else if FALSE_TOKENS.contains(&lowered.as_str()) {
                Ok(false)
            } else {
                Err(Rejection::coercion(format!(
                    "'{}' is not a boolean",
                    cell.as_display()
                )))
            }
        }
    }
}

fn coerce_json(cell: &CellValue, permissive: bool) -> Result<serde_json::Value, Rejection> {
    match cell {
        CellValue::Number(number) => Ok(serde_json::Number::from_f64(*number)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)),
        CellValue::Bool(flag) => Ok(serde_json::Value::Bool(*flag)),
        _ => {
            let text = cleaned_text(cell).unwrap_or_default();
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(parsed) => Ok(parsed),
                Err(_) if permissive => Ok(serde_json::Value::String(text)),
                Err(err) => Err(Rejection::coercion(format!("invalid JSON: {err}"))),
            }
        }
    }
}

fn list_to_json(items: &[CellValue]) -> serde_json::Value {
    serde_json::Value::Array(
        items
            .iter()
            .filter(|item| !item.is_blank())
            .map(|item| match item {
                CellValue::Number(number) => serde_json::Number::from_f64(*number)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                CellValue::Bool(flag) => serde_json::Value::Bool(*flag),
                CellValue::List(nested) => list_to_json(nested),
                other => serde_json::Value::String(clean_input(&other.as_display())),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureKind;
    use chrono::{NaiveDate, NaiveTime};

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    #[test]
    fn clean_input_strips_control_and_format_characters() {
        assert_eq!(clean_input("  test  "), "test");
        assert_eq!(clean_input("test\x00value"), "testvalue");
        assert_eq!(clean_input("test\u{200b}value"), "testvalue");
        assert_eq!(clean_input("test\u{00ad}value"), "testvalue");
        assert_eq!(clean_input("test\u{200e}value"), "testvalue");
        assert_eq!(
            clean_input("  test\x00\u{200b}\nvalue\t\u{00ad}end  "),
            "test\nvalue\tend"
        );
    }

    #[test]
    fn clean_input_preserves_other_unicode() {
        assert_eq!(clean_input("test 😀 value"), "test 😀 value");
        assert_eq!(clean_input("שלום"), "שלום");
        assert_eq!(clean_input("你好"), "你好");
        assert_eq!(clean_input("مرحبا"), "مرحبا");
    }

    #[test]
    fn string_coercion_treats_blank_as_absent() {
        assert_eq!(coerce_scalar(&text("   "), ScalarKind::String, false), Ok(None));
        assert_eq!(
            coerce_scalar(&text(" hi "), ScalarKind::String, false),
            Ok(Some(Value::String("hi".into())))
        );
        assert_eq!(
            coerce_scalar(&CellValue::Number(7.0), ScalarKind::String, false),
            Ok(Some(Value::String("7".into())))
        );
    }

    #[test]
    fn int_dash_digit_rule_sums_both_sides() {
        assert_eq!(
            coerce_scalar(&text("2-2"), ScalarKind::Int, false),
            Ok(Some(Value::Int(4)))
        );
        assert_eq!(
            coerce_scalar(&text("10-5"), ScalarKind::Int, false),
            Ok(Some(Value::Int(15)))
        );
        assert_eq!(
            coerce_scalar(&text("-5"), ScalarKind::Int, false),
            Ok(Some(Value::Int(-5)))
        );
        let spaced = coerce_scalar(&text("10 - 5"), ScalarKind::Int, false).unwrap_err();
        assert_eq!(spaced.kind, FailureKind::TypeCoercionError);
    }

    #[test]
    fn int_accepts_integral_numbers_only() {
        assert_eq!(
            coerce_scalar(&CellValue::Number(42.0), ScalarKind::Int, false),
            Ok(Some(Value::Int(42)))
        );
        assert_eq!(
            coerce_scalar(&text("42.0"), ScalarKind::Int, false),
            Ok(Some(Value::Int(42)))
        );
        assert!(coerce_scalar(&CellValue::Number(2.5), ScalarKind::Int, false).is_err());
        assert!(coerce_scalar(&text("forty"), ScalarKind::Int, false).is_err());
    }

    #[test]
    fn float_rejects_non_numeric_and_non_finite() {
        assert_eq!(
            coerce_scalar(&text("3.25"), ScalarKind::Float, false),
            Ok(Some(Value::Float(3.25)))
        );
        assert!(coerce_scalar(&text("abc"), ScalarKind::Float, false).is_err());
        assert!(coerce_scalar(&text("NaN"), ScalarKind::Float, false).is_err());
    }

    #[test]
    fn boolean_tokens_are_case_insensitive() {
        for token in ["TRUE", "1", "Yes", "y", "V"] {
            assert_eq!(
                coerce_scalar(&text(token), ScalarKind::Boolean, false),
                Ok(Some(Value::Boolean(true))),
                "{token}"
            );
        }
        for token in ["false", "0", "NO", "n", "x"] {
            assert_eq!(
                coerce_scalar(&text(token), ScalarKind::Boolean, false),
                Ok(Some(Value::Boolean(false))),
                "{token}"
            );
        }
        assert!(coerce_scalar(&text("maybe"), ScalarKind::Boolean, false).is_err());
        assert_eq!(
            coerce_scalar(&CellValue::Number(1.0), ScalarKind::Boolean, false),
            Ok(Some(Value::Boolean(true)))
        );
    }

    #[test]
    fn dates_in_all_accepted_forms_agree() {
        let expected = Value::Date(NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
        for raw in ["15/06/2023", "2023-06-15", "15-06-2023"] {
            assert_eq!(
                coerce_scalar(&text(raw), ScalarKind::Date, false),
                Ok(Some(expected.clone())),
                "{raw}"
            );
        }
        assert!(coerce_scalar(&text("June 15th"), ScalarKind::Date, false).is_err());
    }

    #[test]
    fn time_accepts_meridiem() {
        assert_eq!(
            coerce_scalar(&text("9:30 AM"), ScalarKind::Time, false),
            Ok(Some(Value::Time(NaiveTime::from_hms_opt(9, 30, 0).unwrap())))
        );
    }

    #[test]
    fn email_and_url_are_checked_syntactically() {
        assert!(coerce_scalar(&text("a@example.com"), ScalarKind::Email, false).is_ok());
        assert!(coerce_scalar(&text("a@example"), ScalarKind::Email, false).is_err());
        assert!(coerce_scalar(&text("example.com"), ScalarKind::Email, false).is_err());
        assert!(coerce_scalar(&text("https://example.com/x?y=1"), ScalarKind::Url, false).is_ok());
        assert!(coerce_scalar(&text("example.com"), ScalarKind::Url, false).is_err());
        assert!(coerce_scalar(&text("https://"), ScalarKind::Url, false).is_err());
    }

    #[test]
    fn json_falls_back_only_when_permissive() {
        assert_eq!(
            coerce_scalar(&text(r#"{"a":1}"#), ScalarKind::Json, false),
            Ok(Some(Value::Json(serde_json::json!({"a": 1}))))
        );
        assert!(coerce_scalar(&text("not json"), ScalarKind::Json, false).is_err());
        assert_eq!(
            coerce_scalar(&text(" not json "), ScalarKind::Json, true),
            Ok(Some(Value::Json(serde_json::json!("not json"))))
        );
    }

    #[test]
    fn lists_only_fit_json() {
        let list = CellValue::List(vec![text("a"), CellValue::Number(2.0)]);
        assert_eq!(
            coerce_scalar(&list, ScalarKind::Json, false),
            Ok(Some(Value::Json(serde_json::json!(["a", 2.0]))))
        );
        assert!(coerce_scalar(&list, ScalarKind::String, false).is_err());
    }
}
