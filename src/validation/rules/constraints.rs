//! Validation rule for field constraints (type, required, range, length, pattern, enum).

use crate::store::{Field, FieldValue};
use crate::validation::error::{ValidationError, ValidationErrorType};
use regex::Regex;
use std::cmp::Ordering;

/// Checks one value against its field. `pattern` is the field's compiled,
/// fully-anchored pattern, if it has one.
pub fn check_value(field: &Field, value: &FieldValue, pattern: Option<&Regex>) -> Vec<ValidationError> {
    let c = &field.constraints;
    let err = |error_type, message: String| ValidationError::new(field.name.clone(), error_type, message);

    if value.is_null() {
        if c.required {
            return vec![err(ValidationErrorType::Required, "required value is missing".into())];
        }
        return Vec::new();
    }
    if !value.fits(field.field_type) {
        return vec![err(
            ValidationErrorType::TypeMismatch,
            format!("value {} is not of type {}", value, field.field_type),
        )];
    }

    let mut errors = Vec::new();
    if let Some(min) = &c.minimum {
        if value.compare(min) == Some(Ordering::Less) {
            errors.push(err(ValidationErrorType::Constraint, format!("value {} is less than minimum {}", value, min)));
        }
    }
    if let Some(max) = &c.maximum {
        if value.compare(max) == Some(Ordering::Greater) {
            errors.push(err(ValidationErrorType::Constraint, format!("value {} is greater than maximum {}", value, max)));
        }
    }
    if let FieldValue::Text(s) = value {
        let len = s.chars().count();
        if c.min_length.is_some_and(|min| len < min) {
            errors.push(err(ValidationErrorType::Constraint, format!("length {} is below min_length", len)));
        }
        if c.max_length.is_some_and(|max| len > max) {
            errors.push(err(ValidationErrorType::Constraint, format!("length {} is above max_length", len)));
        }
        if pattern.is_some_and(|re| !re.is_match(s)) {
            errors.push(err(ValidationErrorType::Constraint, format!("value {} does not match pattern", s)));
        }
    }
    if let Some(allowed) = &c.enum_values {
        if !allowed.contains(value) {
            errors.push(err(ValidationErrorType::Constraint, format!("value {} is not one of {:?}", value, allowed)));
        }
    }
    errors
}
