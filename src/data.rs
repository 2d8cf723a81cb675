//! Raw cell values, coerced record values, and the date/time parsers shared
//! by the scalar coercers and the sheet readers.

use std::{borrow::Cow, collections::BTreeMap, fmt};

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Serialize, Serializer};

/// One spreadsheet row: raw header text mapped to its cell.
pub type RawRow = BTreeMap<String, CellValue>;

/// A cell exactly as the sheet reader produced it. No formatting or styling
/// information survives to this point.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<CellValue>),
}

impl CellValue {
    /// True for empty cells, whitespace/invisible-only text, and empty lists.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => crate::coerce::clean_input(text).is_empty(),
            CellValue::List(items) => items.iter().all(CellValue::is_blank),
            CellValue::Number(_) | CellValue::Bool(_) => false,
        }
    }

    /// Scalar cells rendered as text; `None` for empty cells and lists.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            CellValue::Text(text) => Some(Cow::Borrowed(text.as_str())),
            CellValue::Number(number) => Some(Cow::Owned(format_number(*number))),
            CellValue::Bool(flag) => Some(Cow::Borrowed(if *flag { "true" } else { "false" })),
            CellValue::Empty | CellValue::List(_) => None,
        }
    }

    /// Lossless-enough rendering used for failure reports.
    pub fn as_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::List(items) => {
                let inner = items
                    .iter()
                    .map(CellValue::as_display)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{inner}]")
            }
            other => other.as_text().map(Cow::into_owned).unwrap_or_default(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl<T: Into<CellValue>> From<Vec<T>> for CellValue {
    fn from(values: Vec<T>) -> Self {
        CellValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Integral floats print without a fractional part so `42.0` reads as `42`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// A value after coercion against its declared field kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Email(String),
    Url(String),
    Json(serde_json::Value),
    Enum(String),
    Reference(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Renders the value in the wire shape the GraphQL backend expects.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::String(s)
            | Value::Email(s)
            | Value::Url(s)
            | Value::Enum(s)
            | Value::Reference(s) => Json::String(s.clone()),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Boolean(b) => Json::Bool(*b),
            Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => Json::String(t.format("%H:%M:%S%.3f").to_string()),
            Value::DateTime(dt) => Json::String(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
            Value::Json(json) => json.clone(),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Text form used when a coerced value becomes a lookup key.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::String(s)
            | Value::Email(s)
            | Value::Url(s)
            | Value::Enum(s)
            | Value::Reference(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::List(_) | Value::Object(_) | Value::Json(_) => None,
            other => match other.to_json() {
                serde_json::Value::String(s) => Some(s),
                json => Some(json.to_string()),
            },
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            serde_json::Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{other}"),
        }
    }
}

const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y"];

const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

const MERIDIEM_TIME_FORMATS: &[&str] = &["%I:%M %p", "%I:%M:%S %p", "%I:%M%p", "%I:%M:%S%p"];

/// ISO forms are only attempted when the value opens with a four digit year,
/// so `15-06-2023` can never be read as year 15.
fn looks_iso(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() >= 10 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b'-'
}

fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc).naive_utc());
    }
    let without_zulu = value.strip_suffix(['Z', 'z']).unwrap_or(value);
    ISO_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(without_zulu, fmt).ok())
}

/// Date formats in priority order: ISO (`YYYY-MM-DD`, optionally followed by a
/// time part which is discarded), `DD/MM/YYYY`, then `DD-MM-YYYY`.
pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    if looks_iso(value) {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(parsed);
        }
        if let Some(parsed) = parse_iso_datetime(value) {
            return Ok(parsed.date());
        }
    }
    DAY_FIRST_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .ok_or_else(|| anyhow!("Failed to parse '{value}' as date"))
}

/// Datetimes with an offset are normalized to UTC; date-only input is midnight.
pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    if looks_iso(value) {
        if let Some(parsed) = parse_iso_datetime(value) {
            return Ok(parsed);
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(date.and_time(NaiveTime::MIN));
        }
    }
    if let Some(parsed) = DAY_FIRST_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    {
        return Ok(parsed);
    }
    DAY_FIRST_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .map(|date| date.and_time(NaiveTime::MIN))
        .ok_or_else(|| anyhow!("Failed to parse '{value}' as datetime"))
}

pub fn parse_naive_time(value: &str) -> Result<NaiveTime> {
    if looks_iso(value) {
        if let Some(parsed) = parse_iso_datetime(value) {
            return Ok(parsed.time());
        }
    }
    let without_zulu = value.strip_suffix(['Z', 'z']).unwrap_or(value);
    if let Some(parsed) = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(without_zulu, fmt).ok())
    {
        return Ok(parsed);
    }
    let upper = value.to_ascii_uppercase();
    MERIDIEM_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&upper, fmt).ok())
        .ok_or_else(|| anyhow!("Failed to parse '{value}' as time"))
}
