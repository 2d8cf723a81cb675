//! Model schemas: the declared fields of each GraphQL model and their kinds.
//!
//! A [`SchemaCatalog`] is produced by the introspection step and stored as
//! YAML. Every field carries a closed [`FieldKind`] so the record assembler can
//! dispatch by exhaustive match:
//!
//! ```yaml
//! models:
//!   Story:
//!     fields:
//!       - { name: title, kind: String, required: true }
//!       - { name: tags, kind: array, element: String }
//!       - { name: status, kind: enum, values: [DRAFT, PUBLISHED] }
//!       - name: locations
//!         kind: custom
//!         list: true
//!         fields:
//!           - { name: street, kind: String, required: true }
//!           - { name: city, kind: String }
//!       - { name: photographerId, kind: foreign_key, related_model: Reporter }
//! ```
//!
//! Kind-specific keys (`element`, `values`, `fields`, `list`, `related_model`,
//! `permissive`) must appear exactly when the kind uses them.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow};
use heck::ToUpperCamelCase;
use itertools::Itertools;
use log::debug;
use serde::Deserialize;
use thiserror::Error;

/// Backend-managed fields that never come from a spreadsheet.
pub const METADATA_FIELDS: &[&str] = &["id", "createdAt", "updatedAt", "owner"];

pub fn is_metadata_field(name: &str) -> bool {
    METADATA_FIELDS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Field name cannot be empty")]
    EmptyName,
    #[error("Unknown kind '{kind}' for field '{field}'")]
    UnknownKind { field: String, kind: String },
    #[error("Field '{field}' of kind {kind} requires '{key}'")]
    MissingKey {
        field: String,
        kind: String,
        key: &'static str,
    },
    #[error("Field '{field}' of kind {kind} does not accept '{key}'")]
    UnexpectedKey {
        field: String,
        kind: String,
        key: &'static str,
    },
    #[error("Composite field '{field}' cannot contain {kind} sub-field '{child}'")]
    UnsupportedSubField {
        field: String,
        child: String,
        kind: String,
    },
    #[error("Field '{field}' is declared more than once in {scope}")]
    DuplicateField { field: String, scope: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Int,
    Float,
    Boolean,
    Date,
    Time,
    DateTime,
    Email,
    Json,
    Url,
}

impl ScalarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::String => "String",
            ScalarKind::Int => "Int",
            ScalarKind::Float => "Float",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::Date => "Date",
            ScalarKind::Time => "Time",
            ScalarKind::DateTime => "DateTime",
            ScalarKind::Email => "Email",
            ScalarKind::Json => "JSON",
            ScalarKind::Url => "URL",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "String", "Int", "Float", "Boolean", "Date", "Time", "DateTime", "Email", "JSON", "URL",
        ]
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalarKind {
    type Err = anyhow::Error;

    /// Accepts plain GraphQL names as well as the AWS AppSync scalar aliases.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "id" | "awsphone" | "awsipaddress" => Ok(ScalarKind::String),
            "int" | "integer" | "awstimestamp" => Ok(ScalarKind::Int),
            "float" | "double" => Ok(ScalarKind::Float),
            "boolean" | "bool" => Ok(ScalarKind::Boolean),
            "date" | "awsdate" => Ok(ScalarKind::Date),
            "time" | "awstime" => Ok(ScalarKind::Time),
            "datetime" | "awsdatetime" | "timestamp" => Ok(ScalarKind::DateTime),
            "email" | "awsemail" => Ok(ScalarKind::Email),
            "json" | "awsjson" => Ok(ScalarKind::Json),
            "url" | "awsurl" => Ok(ScalarKind::Url),
            _ => Err(anyhow!(
                "Unknown scalar kind '{value}'. Supported kinds: {}",
                ScalarKind::variants().join(", ")
            )),
        }
    }
}

/// Element type of an array field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Scalar(ScalarKind),
    Enum(BTreeSet<String>),
}

/// Embedded object type whose sub-fields are flattened into `parent.child` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSchema {
    pub fields: Vec<FieldSchema>,
    /// `true` when the model field holds a list of instances rather than one.
    pub list: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Array(ElementKind),
    Enum(BTreeSet<String>),
    Custom(CompositeSchema),
    ForeignKey(String),
}

impl FieldKind {
    pub fn describe(&self) -> String {
        match self {
            FieldKind::Scalar(kind) => kind.to_string(),
            FieldKind::Array(ElementKind::Scalar(kind)) => format!("[{kind}]"),
            FieldKind::Array(ElementKind::Enum(_)) => "[enum]".to_string(),
            FieldKind::Enum(_) => "enum".to_string(),
            FieldKind::Custom(composite) if composite.list => "[custom]".to_string(),
            FieldKind::Custom(_) => "custom".to_string(),
            FieldKind::ForeignKey(model) => format!("-> {model}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "FieldDocument")]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    /// JSON fields only: keep unparseable text as a JSON string.
    pub permissive: bool,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            permissive: false,
        }
    }

    pub fn scalar(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self::new(name, FieldKind::Scalar(kind))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn permissive(mut self) -> Self {
        self.permissive = true;
        self
    }

    /// `photographerId` -> `photographer`, so a foreign key column may be
    /// labelled after the relation instead of the id field.
    pub fn reference_stem(&self) -> Option<&str> {
        match self.kind {
            FieldKind::ForeignKey(_) => self
                .name
                .strip_suffix("Id")
                .or_else(|| self.name.strip_suffix("ID"))
                .filter(|stem| !stem.is_empty()),
            _ => None,
        }
    }

    pub fn composite(&self) -> Option<&CompositeSchema> {
        match &self.kind {
            FieldKind::Custom(composite) => Some(composite),
            _ => None,
        }
    }
}

fn enum_values<I>(values: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| value.as_ref().trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

impl FieldKind {
    pub fn enumeration<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        FieldKind::Enum(enum_values(values))
    }

    pub fn enum_array<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        FieldKind::Array(ElementKind::Enum(enum_values(values)))
    }
}

/// Serialized shape of one field; validated into a [`FieldSchema`].
#[derive(Debug, Clone, Deserialize)]
struct FieldDocument {
    name: String,
    kind: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    element: Option<String>,
    #[serde(default)]
    values: Option<Vec<String>>,
    #[serde(default)]
    fields: Option<Vec<FieldDocument>>,
    #[serde(default)]
    list: Option<bool>,
    #[serde(default)]
    related_model: Option<String>,
    #[serde(default)]
    permissive: Option<bool>,
}

impl TryFrom<FieldDocument> for FieldSchema {
    type Error = SchemaError;

    fn try_from(document: FieldDocument) -> Result<Self, Self::Error> {
        build_field(document, false)
    }
}

enum DocumentKind {
    Scalar(ScalarKind),
    Array,
    Enum,
    Custom,
    ForeignKey,
}

fn classify_kind(field: &str, kind: &str) -> Result<DocumentKind, SchemaError> {
    let normalized = kind.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    match normalized.as_str() {
        "array" | "list" => Ok(DocumentKind::Array),
        "enum" => Ok(DocumentKind::Enum),
        "custom" | "custom_type" | "object" => Ok(DocumentKind::Custom),
        "foreign_key" | "fk" | "reference" => Ok(DocumentKind::ForeignKey),
        _ => ScalarKind::from_str(kind)
            .map(DocumentKind::Scalar)
            .map_err(|_| SchemaError::UnknownKind {
                field: field.to_string(),
                kind: kind.to_string(),
            }),
    }
}

fn build_field(document: FieldDocument, nested: bool) -> Result<FieldSchema, SchemaError> {
    let name = document.name.trim().to_string();
    if name.is_empty() {
        return Err(SchemaError::EmptyName);
    }
    let kind_label = document.kind.trim().to_string();
    let missing = |key: &'static str| SchemaError::MissingKey {
        field: name.clone(),
        kind: kind_label.clone(),
        key,
    };
    let unexpected = |key: &'static str| SchemaError::UnexpectedKey {
        field: name.clone(),
        kind: kind_label.clone(),
        key,
    };

    let classified = classify_kind(&name, &document.kind)?;
    let is_json = matches!(classified, DocumentKind::Scalar(ScalarKind::Json));
    let uses_values = match &classified {
        DocumentKind::Enum => true,
        DocumentKind::Array => document
            .element
            .as_deref()
            .is_some_and(|element| element.trim().eq_ignore_ascii_case("enum")),
        _ => false,
    };
    if !matches!(classified, DocumentKind::Array) && document.element.is_some() {
        return Err(unexpected("element"));
    }
    if !uses_values && document.values.is_some() {
        return Err(unexpected("values"));
    }
    if !matches!(classified, DocumentKind::Custom) {
        if document.fields.is_some() {
            return Err(unexpected("fields"));
        }
        if document.list.is_some() {
            return Err(unexpected("list"));
        }
    }
    if !matches!(classified, DocumentKind::ForeignKey) && document.related_model.is_some() {
        return Err(unexpected("related_model"));
    }
    if !is_json && document.permissive.is_some() {
        return Err(unexpected("permissive"));
    }

    let kind = match classified {
        DocumentKind::Scalar(scalar) => FieldKind::Scalar(scalar),
        DocumentKind::Array => {
            let element = document.element.as_deref().ok_or_else(|| missing("element"))?;
            if uses_values {
                let values = enum_values(document.values.unwrap_or_default());
                if values.is_empty() {
                    return Err(missing("values"));
                }
                FieldKind::Array(ElementKind::Enum(values))
            } else {
                let scalar =
                    ScalarKind::from_str(element).map_err(|_| SchemaError::UnknownKind {
                        field: name.clone(),
                        kind: element.to_string(),
                    })?;
                FieldKind::Array(ElementKind::Scalar(scalar))
            }
        }
        DocumentKind::Enum => {
            let values = enum_values(document.values.unwrap_or_default());
            if values.is_empty() {
                return Err(missing("values"));
            }
            FieldKind::Enum(values)
        }
        DocumentKind::Custom => {
            if nested {
                return Err(SchemaError::UnsupportedSubField {
                    field: String::new(),
                    child: name.clone(),
                    kind: kind_label.clone(),
                });
            }
            let children = document.fields.ok_or_else(|| missing("fields"))?;
            if children.is_empty() {
                return Err(missing("fields"));
            }
            let mut fields = Vec::with_capacity(children.len());
            for child in children {
                let child = build_field(child, true).map_err(|err| match err {
                    SchemaError::UnsupportedSubField { child, kind, .. } => {
                        SchemaError::UnsupportedSubField {
                            field: name.clone(),
                            child,
                            kind,
                        }
                    }
                    other => other,
                })?;
                fields.push(child);
            }
            ensure_unique(&fields, &name)?;
            FieldKind::Custom(CompositeSchema {
                fields,
                list: document.list.unwrap_or(false),
            })
        }
        DocumentKind::ForeignKey => {
            if nested {
                return Err(SchemaError::UnsupportedSubField {
                    field: String::new(),
                    child: name.clone(),
                    kind: kind_label.clone(),
                });
            }
            let related = match document.related_model {
                Some(model) if !model.trim().is_empty() => model.trim().to_string(),
                _ => infer_related_model(&name).ok_or_else(|| missing("related_model"))?,
            };
            FieldKind::ForeignKey(related)
        }
    };

    Ok(FieldSchema {
        name,
        kind,
        required: document.required,
        permissive: document.permissive.unwrap_or(false),
    })
}

/// `authorId` -> `Author`, following the belongsTo naming convention.
fn infer_related_model(field: &str) -> Option<String> {
    let stem = field
        .strip_suffix("Id")
        .or_else(|| field.strip_suffix("ID"))
        .filter(|stem| !stem.is_empty())?;
    Some(stem.to_upper_camel_case())
}

fn ensure_unique(fields: &[FieldSchema], scope: &str) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name.to_ascii_lowercase()) {
            return Err(SchemaError::DuplicateField {
                field: field.name.clone(),
                scope: scope.to_string(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl ModelSchema {
    /// Builds a model, dropping backend metadata fields the way introspection does.
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>) -> Result<Self, SchemaError> {
        let name = name.into();
        let fields = fields
            .into_iter()
            .filter(|field| {
                let metadata = is_metadata_field(&field.name);
                if metadata {
                    debug!("Skipping metadata field '{}' on model {name}", field.name);
                }
                !metadata
            })
            .collect::<Vec<_>>();
        ensure_unique(&fields, &name)?;
        Ok(Self { name, fields })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn related_models(&self) -> BTreeSet<&str> {
        self.fields
            .iter()
            .filter_map(|field| match &field.kind {
                FieldKind::ForeignKey(model) => Some(model.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    models: BTreeMap<String, ModelDocument>,
}

#[derive(Debug, Deserialize)]
struct ModelDocument {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    models: BTreeMap<String, ModelSchema>,
}

impl SchemaCatalog {
    pub fn insert(&mut self, model: ModelSchema) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }

    pub fn require_model(&self, name: &str) -> Result<&ModelSchema> {
        self.model(name).ok_or_else(|| {
            anyhow!(
                "Model '{name}' is not defined in the schema. Known models: {}",
                self.models.keys().join(", ")
            )
        })
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let document: CatalogDocument =
            serde_yaml::from_str(contents).context("Parsing schema YAML")?;
        Self::from_document(document)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let document: CatalogDocument = serde_yaml::from_reader(reader)
            .with_context(|| format!("Parsing schema YAML {path:?}"))?;
        Self::from_document(document)
    }

    fn from_document(document: CatalogDocument) -> Result<Self> {
        let mut catalog = SchemaCatalog::default();
        for (name, model) in document.models {
            let model = ModelSchema::new(name.clone(), model.fields)
                .with_context(|| format!("Validating model '{name}'"))?;
            catalog.insert(model);
        }
        Ok(catalog)
    }
}
