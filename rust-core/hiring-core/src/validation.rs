//! # Validation Module
//!
//! Structured validation errors shared by configuration checks and
//! request-time input validation.
//!
//! Errors are collected, never short-circuited: callers add every violation
//! they find and report the whole set at once.

use serde::Serialize;
use std::fmt;

/// Error code for categorizing validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// Required field is missing
    Required,
    /// Value does not parse as the expected type
    InvalidType,
}

/// A single validation error for a specific field
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    /// Field name (e.g. "postgres.read.host")
    pub field: String,
    /// Human-readable error message
    pub message: String,
    /// Machine-readable error code
    pub code: ValidationCode,
}

impl FieldError {
    /// Missing or empty field
    pub fn required(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} is required"),
            field,
            code: ValidationCode::Required,
        }
    }

    /// Value that does not parse as `expected`
    pub fn invalid_type(field: impl Into<String>, expected: &str) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} must be {expected}"),
            field,
            code: ValidationCode::InvalidType,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Collection of validation errors
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationErrors {
    /// List of field-level errors
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Create an empty error collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field error
    pub fn add(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    /// Add a required field error
    pub fn add_required(&mut self, field: impl Into<String>) {
        self.add(FieldError::required(field));
    }

    /// Append every error from another collection
    pub fn merge(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    /// Check if there are any errors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of errors
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `Ok(())` when empty, otherwise the collection itself
    ///
    /// # Errors
    ///
    /// Returns `self` when at least one error was recorded.
    pub fn into_result(self) -> ValidationResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Convert to JSON response body
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"errors":[]}"#.to_string())
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Result type for validation operations
pub type ValidationResult<T> = std::result::Result<T, ValidationErrors>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_required() {
        let error = FieldError::required("email");
        assert_eq!(error.field, "email");
        assert_eq!(error.code, ValidationCode::Required);
        assert!(error.message.contains("required"));
    }

    #[test]
    fn test_validation_errors_add() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());

        errors.add_required("email");
        errors.add(FieldError::invalid_type("port", "a port number"));

        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_validation_errors_json() {
        let mut errors = ValidationErrors::new();
        errors.add_required("email");

        let json = errors.to_json();
        assert!(json.contains("email"));
        assert!(json.contains("REQUIRED"));
    }

    #[test]
    fn test_display_joins_every_error() {
        let mut errors = ValidationErrors::new();
        errors.add_required("read host");
        errors.add(FieldError::invalid_type("write port", "a port number"));

        assert_eq!(
            errors.to_string(),
            "read host is required; write port must be a port number"
        );
    }

    #[test]
    fn test_merge_and_into_result() {
        let mut first = ValidationErrors::new();
        first.add_required("a");
        let mut second = ValidationErrors::new();
        second.add_required("b");

        first.merge(second);
        let err = first.into_result().unwrap_err();
        assert_eq!(err.len(), 2);

        assert!(ValidationErrors::new().into_result().is_ok());
    }
}
