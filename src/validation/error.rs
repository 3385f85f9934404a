//! Defines the error types for the validation module.
use thiserror::Error;

/// The specific category of a validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorType {
    /// A value does not have the type its field declares.
    TypeMismatch,
    /// A value violates one of its field's constraints (range, length, pattern, enum).
    Constraint,
    /// A required field is null.
    Required,
    /// A value repeats in a field declared unique, or a primary key repeats.
    Unique,
    /// A field, foreign key or schema is malformed (checked at construction).
    Definition,
    /// A string category dictionary is malformed.
    Category,
}

/// A structured error report from the metadata layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// The field (or category dictionary) where the error was detected.
    pub field: String,
    pub error_type: ValidationErrorType,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, error_type: ValidationErrorType, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            error_type,
            message: message.into(),
        }
    }

    pub fn definition(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, ValidationErrorType::Definition, message)
    }
}
