//! The central validator that runs every field rule over the rows of a resource.
use super::error::{ValidationError, ValidationErrorType};
use super::rules::constraints;
use crate::store::{FieldValue, Resource};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A row of a resource, keyed by field name. Missing fields read as null.
pub type Record = BTreeMap<String, FieldValue>;

/// Checks rows against the schema of one resource.
///
/// Collects every error rather than stopping at the first one.
pub struct Validator<'a> {
    resource: &'a Resource,
    patterns: HashMap<String, Regex>,
}

impl<'a> Validator<'a> {
    /// Creates a validator, compiling the field patterns once. Patterns must match a whole value.
    pub fn new(resource: &'a Resource) -> Result<Self, ValidationError> {
        let mut patterns = HashMap::new();
        for field in resource.schema.fields() {
            if let Some(p) = &field.constraints.pattern {
                let re = Regex::new(&format!("^(?:{})$", p))
                    .map_err(|e| ValidationError::definition(field.name.clone(), format!("invalid pattern: {}", e)))?;
                patterns.insert(field.name.clone(), re);
            }
        }
        Ok(Self { resource, patterns })
    }

    /// # Returns
    /// - `Ok(())` if no validation errors are found.
    /// - `Err(Vec<ValidationError>)` containing all errors discovered in the rows.
    pub fn validate(&self, rows: &[Record]) -> Result<(), Vec<ValidationError>> {
        let schema = &self.resource.schema;
        let mut errors = Vec::new();
        let mut seen: HashMap<&str, HashSet<String>> = HashMap::new();
        let mut seen_keys: HashSet<Vec<String>> = HashSet::new();

        for (i, row) in rows.iter().enumerate() {
            for name in row.keys() {
                if schema.field(name).is_none() {
                    errors.push(ValidationError::new(
                        name.clone(),
                        ValidationErrorType::Definition,
                        format!("row {}: column is not a field of {}", i, self.resource.name),
                    ));
                }
            }

            for field in schema.fields() {
                let value = row.get(&field.name).unwrap_or(&FieldValue::Null);
                let pattern = self.patterns.get(&field.name);
                errors.extend(constraints::check_value(field, value, pattern).into_iter().map(|mut e| {
                    e.message = format!("row {}: {}", i, e.message);
                    e
                }));

                if field.constraints.unique && !value.is_null() {
                    let values = seen.entry(field.name.as_str()).or_default();
                    if !values.insert(value.to_string()) {
                        errors.push(ValidationError::new(
                            field.name.clone(),
                            ValidationErrorType::Unique,
                            format!("row {}: value {} is not unique", i, value),
                        ));
                    }
                }
            }

            if !schema.primary_key().is_empty() {
                let key: Vec<String> = schema
                    .primary_key()
                    .iter()
                    .map(|k| row.get(k).unwrap_or(&FieldValue::Null).to_string())
                    .collect();
                if !seen_keys.insert(key.clone()) {
                    errors.push(ValidationError::new(
                        "primary_key",
                        ValidationErrorType::Unique,
                        format!("row {}: primary key ({}) is not unique", i, key.join(", ")),
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Field, FieldConstraints, FieldType, Schema};

    fn resource() -> Resource {
        let fields = vec![
            Field::new("plant_id", FieldType::Integer, FieldConstraints::default()).unwrap(),
            Field::new("report_year", FieldType::Year, FieldConstraints::range(1994i64, 2030i64)).unwrap(),
            Field::new(
                "plant_name",
                FieldType::String,
                FieldConstraints { unique: true, pattern: Some("[a-z ]+".into()), ..Default::default() },
            )
            .unwrap(),
        ];
        let schema = Schema::new(fields, vec!["plant_id".into(), "report_year".into()], vec![]).unwrap();
        Resource::new("plants", schema)
    }

    fn record(id: i64, year: i64, name: &str) -> Record {
        [
            ("plant_id".to_string(), FieldValue::Int(id)),
            ("report_year".to_string(), FieldValue::Int(year)),
            ("plant_name".to_string(), FieldValue::from(name)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_valid_rows_pass() {
        let res = resource();
        let validator = Validator::new(&res).unwrap();
        assert!(validator.validate(&[record(1, 2020, "big hill"), record(2, 2020, "low hill")]).is_ok());
    }

    #[test]
    fn test_all_errors_are_collected() {
        let res = resource();
        let validator = Validator::new(&res).unwrap();
        let mut missing_key = record(3, 2021, "other");
        missing_key.remove("plant_id");
        let errors = validator
            .validate(&[
                record(1, 2020, "big hill"),
                record(1, 2020, "big hill"), // Repeated primary key and unique name
                record(2, 1900, "Mixed Case"),
                missing_key,
            ])
            .unwrap_err();

        let kinds: Vec<(&str, ValidationErrorType)> =
            errors.iter().map(|e| (e.field.as_str(), e.error_type.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                ("plant_name", ValidationErrorType::Unique),
                ("primary_key", ValidationErrorType::Unique),
                ("report_year", ValidationErrorType::Constraint),
                ("plant_name", ValidationErrorType::Constraint),
                ("plant_id", ValidationErrorType::Required),
            ]
        );
    }
}
