//! Tabular resource schemas: typed, constrained fields and the keys between resources.
//!
//! Only the shape of the metadata layer is modelled here. Every constructor
//! checks the definition it is handed, so a `Schema` in hand is well-formed.

use crate::validation::{ValidationError, ValidationErrorType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Date,
    Datetime,
    Year,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Year => "year",
        };
        f.write_str(name)
    }
}

/// A single cell checked against a field. Dates travel as ISO-8601 text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool { matches!(self, FieldValue::Null) }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Number(x) => Some(*x),
            _ => None,
        }
    }

    /// True when the value can be stored in a field of type `dtype`. Null fits any type.
    pub fn fits(&self, dtype: FieldType) -> bool {
        match (self, dtype) {
            (FieldValue::Null, _) => true,
            (FieldValue::Text(_), FieldType::String) => true,
            (FieldValue::Int(_), FieldType::Integer | FieldType::Number | FieldType::Year) => true,
            (FieldValue::Number(_), FieldType::Number) => true,
            (FieldValue::Bool(_), FieldType::Boolean) => true,
            (FieldValue::Text(s), FieldType::Date) => is_iso_date(s),
            (FieldValue::Text(s), FieldType::Datetime) => is_iso_datetime(s),
            _ => false,
        }
    }

    /// Orders numbers numerically and text (including ISO dates) lexically.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Number(x) => write!(f, "{}", x),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self { FieldValue::Text(value.to_string()) }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self { FieldValue::Int(value) }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self { FieldValue::Number(value) }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self { FieldValue::Bool(value) }
}

fn is_iso_date(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter().enumerate().all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
}

fn is_iso_datetime(s: &str) -> bool {
    s.len() >= 19
        && s.is_char_boundary(10)
        && is_iso_date(&s[..10])
        && matches!(s.as_bytes()[10], b'T' | b' ')
        && s.as_bytes()[13] == b':'
        && s.as_bytes()[16] == b':'
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConstraints {
    pub required: bool,
    pub unique: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<FieldValue>,
    pub maximum: Option<FieldValue>,
    pub pattern: Option<String>,
    #[serde(rename = "enum")]
    pub enum_values: Option<Vec<FieldValue>>,
}

impl FieldConstraints {
    pub fn range(minimum: impl Into<FieldValue>, maximum: impl Into<FieldValue>) -> Self {
        Self {
            minimum: Some(minimum.into()),
            maximum: Some(maximum.into()),
            ..Default::default()
        }
    }

    fn check(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if max < min {
                errors.push("max_length must be greater or equal to min_length".to_string());
            }
        }
        if let (Some(min), Some(max)) = (&self.minimum, &self.maximum) {
            match max.compare(min) {
                Some(Ordering::Less) => errors.push("maximum must be greater or equal to minimum".to_string()),
                None => errors.push("maximum must be same type as minimum".to_string()),
                _ => {}
            }
        }
        if let Some(values) = &self.enum_values {
            let mut seen = BTreeSet::new();
            for v in values {
                if !seen.insert(v.to_string()) {
                    errors.push(format!("enum value {} is not unique", v));
                }
            }
        }
        errors
    }
}

/// A field of a resource schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub description: Option<String>,
    pub constraints: FieldConstraints,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        constraints: FieldConstraints,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        let mut errors = constraints.check();

        let string_only = [
            ("min_length", constraints.min_length.is_some()),
            ("max_length", constraints.max_length.is_some()),
            ("pattern", constraints.pattern.is_some()),
        ];
        for (key, present) in string_only {
            if present && field_type != FieldType::String {
                errors.push(format!("{} not supported by {} field", key, field_type));
            }
        }
        for (key, bound) in [("minimum", &constraints.minimum), ("maximum", &constraints.maximum)] {
            if let Some(x) = bound {
                if matches!(field_type, FieldType::String | FieldType::Boolean) {
                    errors.push(format!("{} not supported by {} field", key, field_type));
                } else if !x.fits(field_type) {
                    errors.push(format!("{} not {}", key, field_type));
                }
            }
        }
        for x in constraints.enum_values.iter().flatten() {
            if !x.fits(field_type) {
                errors.push(format!("enum value {} not {}", x, field_type));
            }
        }
        if let Some(pattern) = &constraints.pattern {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(format!("invalid pattern: {}", e));
            }
        }

        if !errors.is_empty() {
            return Err(ValidationError::definition(name, errors.join("; ")));
        }
        Ok(Self { name, field_type, description: None, constraints })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyReference {
    pub resource: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub fields: Vec<String>,
    pub reference: ForeignKeyReference,
}

impl ForeignKey {
    pub fn new(
        fields: Vec<String>,
        resource: impl Into<String>,
        reference_fields: Vec<String>,
    ) -> Result<Self, ValidationError> {
        let label = fields.join(", ");
        if fields.len() != reference_fields.len() {
            return Err(ValidationError::definition(
                label,
                "fields and reference.fields are not equal length",
            ));
        }
        for names in [&fields, &reference_fields] {
            if let Some(dup) = first_duplicate(names) {
                return Err(ValidationError::definition(label, format!("{} is not unique", dup)));
            }
        }
        Ok(Self {
            fields,
            reference: ForeignKeyReference { resource: resource.into(), fields: reference_fields },
        })
    }
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = BTreeSet::new();
    names.iter().find(|n| !seen.insert(n.as_str())).map(String::as_str)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<Field>,
    primary_key: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    /// Builds a schema, flagging every primary-key field as required.
    pub fn new(
        mut fields: Vec<Field>,
        primary_key: Vec<String>,
        foreign_keys: Vec<ForeignKey>,
    ) -> Result<Self, ValidationError> {
        let names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        if let Some(dup) = first_duplicate(&names) {
            return Err(ValidationError::definition(dup, "field names are not unique"));
        }

        let missing: Vec<&String> = primary_key.iter().filter(|k| !names.contains(k)).collect();
        if !missing.is_empty() {
            return Err(ValidationError::definition(
                "primary_key",
                format!("names {:?} missing from fields", missing),
            ));
        }
        for field in fields.iter_mut().filter(|f| primary_key.contains(&f.name)) {
            field.constraints.required = true;
        }

        for fk in &foreign_keys {
            let missing: Vec<&String> = fk.fields.iter().filter(|k| !names.contains(k)).collect();
            if !missing.is_empty() {
                return Err(ValidationError::definition(
                    "foreign_keys",
                    format!("names {:?} missing from fields", missing),
                ));
            }
        }
        Ok(Self { fields, primary_key, foreign_keys })
    }

    pub fn fields(&self) -> &[Field] { &self.fields }
    pub fn primary_key(&self) -> &[String] { &self.primary_key }
    pub fn foreign_keys(&self) -> &[ForeignKey] { &self.foreign_keys }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A named table described by a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub name: String,
    pub schema: Schema,
}

impl Resource {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self { name: name.into(), schema }
    }
}

/// Checks that every foreign key of `resources` points at the primary key of
/// another resource in the same set.
pub fn check_foreign_keys(resources: &[Resource]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    for resource in resources {
        for fk in resource.schema.foreign_keys() {
            let tag = format!("[{} -> {}]", resource.name, fk.reference.resource);
            let Some(reference) = resources.iter().find(|r| r.name == fk.reference.resource) else {
                errors.push(ValidationError::definition(tag, "Reference not found"));
                continue;
            };
            let pk = reference.schema.primary_key();
            if pk.is_empty() {
                errors.push(ValidationError::definition(tag, "Reference missing primary key"));
                continue;
            }
            let missing: Vec<&String> = fk.reference.fields.iter().filter(|f| !pk.contains(f)).collect();
            if !missing.is_empty() {
                errors.push(ValidationError::new(
                    tag,
                    ValidationErrorType::Definition,
                    format!("Reference primary key missing {:?}", missing),
                ));
            }
        }
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
