//! Checks rows against the table schemas and categorizes free-form strings.
pub mod error;
pub mod rules;
pub mod validator;

pub use error::{ValidationError, ValidationErrorType};
pub use rules::categories::StringCategories;
pub use rules::constraints::check_value;
pub use validator::{Record, Validator};
