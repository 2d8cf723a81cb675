//! Header normalization and per-sheet column resolution.
//!
//! Raw headers arrive in whatever casing the sheet author picked (`First Name`,
//! `first_name`, `first-name`, `firstName`). [`normalize_header`] reduces them
//! to a camelCase candidate that is compared case-insensitively against the
//! model's field names. Headers containing `.` address a composite sub-field
//! (`Address.Street` -> `address` / `street`).

use std::collections::HashMap;

use log::debug;

use crate::{
    coerce::clean_input,
    data::{CellValue, RawRow},
    schema::{FieldKind, ModelSchema, is_metadata_field},
};

static EMPTY_CELL: CellValue = CellValue::Empty;

/// `user name-id` -> `userNameId`, `Zip_Code` -> `zipCode`.
pub fn normalize_header(raw: &str) -> String {
    let cleaned = clean_input(raw);
    let mut output = String::with_capacity(cleaned.len());
    for (position, segment) in cleaned
        .split(|ch: char| ch == '-' || ch == '_' || ch.is_whitespace())
        .filter(|segment| !segment.is_empty())
        .enumerate()
    {
        let mut chars = segment.chars();
        let Some(first) = chars.next() else {
            continue;
        };
        if position == 0 {
            output.extend(first.to_lowercase());
            output.push_str(chars.as_str());
        } else {
            output.extend(first.to_uppercase());
            output.push_str(&chars.as_str().to_lowercase());
        }
    }
    output
}

/// What a single raw column was resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    Field { field: String },
    SubField { field: String, child: String },
    /// Foreign key column labelled after the relation (`Photographer` for `photographerId`).
    Alias { field: String },
    Metadata,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnResolution {
    pub header: String,
    pub normalized: String,
    pub role: ColumnRole,
}

/// Raw headers feeding one declared field, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldColumns {
    /// Exact matches first, then relation aliases.
    pub direct: Vec<String>,
    /// Composite fields only: one header list per declared sub-field.
    pub sub_fields: Vec<Vec<String>>,
}

impl FieldColumns {
    pub fn is_present(&self) -> bool {
        !self.direct.is_empty() || self.sub_fields.iter().any(|headers| !headers.is_empty())
    }

    /// First non-blank cell among the direct columns, or an empty cell when
    /// every column is blank. `None` when the field has no column at all.
    pub fn direct_cell<'r>(&self, row: &'r RawRow) -> Option<&'r CellValue> {
        first_filled(&self.direct, row)
    }

    pub fn sub_field_cell<'r>(&self, index: usize, row: &'r RawRow) -> Option<&'r CellValue> {
        self.sub_fields
            .get(index)
            .and_then(|headers| first_filled(headers, row))
    }
}

fn first_filled<'r>(headers: &[String], row: &'r RawRow) -> Option<&'r CellValue> {
    if headers.is_empty() {
        return None;
    }
    Some(
        headers
            .iter()
            .filter_map(|header| row.get(header))
            .find(|cell| !cell.is_blank())
            .unwrap_or(&EMPTY_CELL),
    )
}

/// Column resolution for one sheet against one model, computed once and
/// reused for every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMap {
    fields: Vec<FieldColumns>,
    resolutions: Vec<ColumnResolution>,
}

impl HeaderMap {
    pub fn build<S: AsRef<str>>(model: &ModelSchema, headers: &[S]) -> Self {
        let by_name: HashMap<String, usize> = model
            .fields
            .iter()
            .enumerate()
            .map(|(idx, field)| (field.name.to_lowercase(), idx))
            .collect();
        let by_stem: HashMap<String, usize> = model
            .fields
            .iter()
            .enumerate()
            .filter_map(|(idx, field)| field.reference_stem().map(|stem| (stem.to_lowercase(), idx)))
            .collect();

        let mut fields: Vec<FieldColumns> = model
            .fields
            .iter()
            .map(|field| FieldColumns {
                direct: Vec::new(),
                sub_fields: vec![
                    Vec::new();
                    field.composite().map_or(0, |composite| composite.fields.len())
                ],
            })
            .collect();
        let mut aliases: Vec<Vec<String>> = vec![Vec::new(); model.fields.len()];
        let mut resolutions = Vec::with_capacity(headers.len());

        for header in headers {
            let header = header.as_ref();
            let (normalized, role) = resolve_column(model, header, &by_name, &by_stem);
            match &role {
                ColumnRole::Field { field } => {
                    if let Some(&idx) = by_name.get(&field.to_lowercase()) {
                        fields[idx].direct.push(header.to_string());
                    }
                }
                ColumnRole::Alias { field } => {
                    if let Some(&idx) = by_name.get(&field.to_lowercase()) {
                        aliases[idx].push(header.to_string());
                    }
                }
                ColumnRole::SubField { field, child } => {
                    if let Some(&idx) = by_name.get(&field.to_lowercase())
                        && let Some(composite) = model.fields[idx].composite()
                        && let Some(position) = composite
                            .fields
                            .iter()
                            .position(|sub| sub.name == *child)
                    {
                        fields[idx].sub_fields[position].push(header.to_string());
                    }
                }
                ColumnRole::Metadata => debug!("Ignoring metadata column '{header}'"),
                ColumnRole::Unknown => debug!(
                    "Column '{header}' (normalized '{normalized}') matches no field of {}",
                    model.name
                ),
            }
            resolutions.push(ColumnResolution {
                header: header.to_string(),
                normalized,
                role,
            });
        }

        for (columns, alias_headers) in fields.iter_mut().zip(aliases) {
            columns.direct.extend(alias_headers);
        }
        for (field, columns) in model.fields.iter().zip(&fields) {
            if columns.is_present() {
                debug!("Field '{}' reads from {:?}", field.name, columns);
            }
        }
        Self {
            fields,
            resolutions,
        }
    }

    /// Columns for the field at `index` in model declaration order.
    pub fn columns(&self, index: usize) -> Option<&FieldColumns> {
        self.fields.get(index)
    }

    pub fn resolutions(&self) -> &[ColumnResolution] {
        &self.resolutions
    }

    pub fn unknown_headers(&self) -> impl Iterator<Item = &str> {
        self.resolutions
            .iter()
            .filter(|resolution| resolution.role == ColumnRole::Unknown)
            .map(|resolution| resolution.header.as_str())
    }
}

fn resolve_column(
    model: &ModelSchema,
    header: &str,
    by_name: &HashMap<String, usize>,
    by_stem: &HashMap<String, usize>,
) -> (String, ColumnRole) {
    if let Some((prefix, child)) = header.split_once('.') {
        let parent = normalize_header(prefix);
        let child = normalize_header(child);
        let normalized = format!("{parent}.{child}");
        let role = by_name
            .get(&parent.to_lowercase())
            .and_then(|&idx| {
                let field = &model.fields[idx];
                let composite = field.composite()?;
                composite
                    .fields
                    .iter()
                    .find(|sub| sub.name.eq_ignore_ascii_case(&child))
                    .map(|sub| ColumnRole::SubField {
                        field: field.name.clone(),
                        child: sub.name.clone(),
                    })
            })
            .unwrap_or(ColumnRole::Unknown);
        return (normalized, role);
    }

    let normalized = normalize_header(header);
    if is_metadata_field(&normalized) {
        return (normalized, ColumnRole::Metadata);
    }
    let key = normalized.to_lowercase();
    let role = if let Some(&idx) = by_name.get(&key) {
        let field = &model.fields[idx];
        match field.kind {
            // Composites are only fed through `parent.child` columns.
            FieldKind::Custom(_) => ColumnRole::Unknown,
            _ => ColumnRole::Field {
                field: field.name.clone(),
            },
        }
    } else if let Some(&idx) = by_stem.get(&key) {
        ColumnRole::Alias {
            field: model.fields[idx].name.clone(),
        }
    } else {
        ColumnRole::Unknown
    };
    (normalized, role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CompositeSchema, FieldSchema, ScalarKind};

    fn story() -> ModelSchema {
        ModelSchema::new(
            "Story",
            vec![
                FieldSchema::scalar("title", ScalarKind::String).required(),
                FieldSchema::scalar("firstName", ScalarKind::String),
                FieldSchema::new(
                    "address",
                    FieldKind::Custom(CompositeSchema {
                        fields: vec![
                            FieldSchema::scalar("street", ScalarKind::String),
                            FieldSchema::scalar("zipCode", ScalarKind::String),
                        ],
                        list: true,
                    }),
                ),
                FieldSchema::new("photographerId", FieldKind::ForeignKey("Reporter".into())),
            ],
        )
        .unwrap()
    }

    #[test]
    fn normalizes_common_header_styles() {
        assert_eq!(normalize_header("first_name"), "firstName");
        assert_eq!(normalize_header("First Name"), "firstName");
        assert_eq!(normalize_header("first-name"), "firstName");
        assert_eq!(normalize_header("firstName"), "firstName");
        assert_eq!(normalize_header("  user name-id "), "userNameId");
        assert_eq!(normalize_header("APIKey"), "aPIKey");
        assert_eq!(normalize_header("zip__code"), "zipCode");
    }

    #[test]
    fn resolves_fields_sub_fields_and_aliases() {
        let headers = [
            "Title",
            "first_name",
            "Address.Street",
            "address.zip_code",
            "Photographer",
            "createdAt",
            "notes",
        ];
        let map = HeaderMap::build(&story(), &headers);
        assert_eq!(map.columns(0).unwrap().direct, vec!["Title"]);
        assert_eq!(map.columns(1).unwrap().direct, vec!["first_name"]);
        let address = map.columns(2).unwrap();
        assert!(address.direct.is_empty());
        assert_eq!(address.sub_fields, vec![vec!["Address.Street"], vec!["address.zip_code"]]);
        assert_eq!(map.columns(3).unwrap().direct, vec!["Photographer"]);
        assert_eq!(map.resolutions()[5].role, ColumnRole::Metadata);
        assert_eq!(map.unknown_headers().collect::<Vec<_>>(), vec!["notes"]);
    }

    #[test]
    fn canonical_foreign_key_column_precedes_alias() {
        let map = HeaderMap::build(&story(), &["photographer", "photographerId"]);
        assert_eq!(
            map.columns(3).unwrap().direct,
            vec!["photographerId", "photographer"]
        );
    }

    #[test]
    fn first_non_blank_duplicate_column_wins() {
        let map = HeaderMap::build(&story(), &["title", "Title"]);
        let mut row = RawRow::new();
        row.insert("title".into(), CellValue::Text("  ".into()));
        row.insert("Title".into(), CellValue::Text("Second".into()));
        assert_eq!(
            map.columns(0).unwrap().direct_cell(&row),
            Some(&CellValue::Text("Second".into()))
        );
        assert_eq!(map.columns(1).unwrap().direct_cell(&row), None);
    }

    #[test]
    fn metadata_columns_are_ignored_even_when_named_like_fields() {
        let map = HeaderMap::build(&story(), &["ID", "owner", "updated_at"]);
        assert!(
            map.resolutions()
                .iter()
                .all(|resolution| resolution.role == ColumnRole::Metadata)
        );
    }
}
