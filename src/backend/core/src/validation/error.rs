//! Field-level validation errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CadenceError, ErrorCode};

// ═══════════════════════════════════════════════════════════════════════════════
// Validation Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// The kind of validation error that occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// Field is required but was missing or empty.
    Required,
    /// String length exceeds the maximum.
    MaxLength { max: usize, actual: usize },
    /// Duration or count must be strictly positive.
    NotPositive,
    /// Value does not match the expected email format.
    InvalidEmail,
    /// Value does not match the expected URL format.
    InvalidUrl,
    /// Value is not in the allowed set.
    NotInSet { allowed: Vec<String> },
    /// Custom validation failed.
    Custom { code: String },
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "field is required"),
            Self::MaxLength { max, actual } => {
                write!(f, "must be at most {} characters (got {})", max, actual)
            }
            Self::NotPositive => write!(f, "must be greater than zero"),
            Self::InvalidEmail => write!(f, "must be a valid email address"),
            Self::InvalidUrl => write!(f, "must be a valid http(s) URL"),
            Self::NotInSet { allowed } => write!(f, "must be one of: {}", allowed.join(", ")),
            Self::Custom { code } => write!(f, "validation failed: {}", code),
        }
    }
}

/// A single validation error for a specific field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(kind: ValidationErrorKind) -> Self {
        let message = kind.to_string();
        Self { kind, message }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Validation Errors Collection
// ═══════════════════════════════════════════════════════════════════════════════

/// Validation errors keyed by field path (e.g. `configuration.timeout`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationErrors {
    #[serde(flatten)]
    errors: BTreeMap<String, Vec<FieldError>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add(&mut self, field: impl Into<String>, error: FieldError) {
        self.errors.entry(field.into()).or_default().push(error);
    }

    pub fn add_error(&mut self, field: impl Into<String>, kind: ValidationErrorKind) {
        self.add(field, FieldError::new(kind));
    }

    pub fn has_errors(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Merge another collection, prefixing its field paths.
    pub fn merge_with_prefix(&mut self, prefix: &str, other: ValidationErrors) {
        for (field, errors) in other.errors {
            let path = format!("{}.{}", prefix, field);
            self.errors.entry(path).or_default().extend(errors);
        }
    }

    /// `field: message` lines in field order.
    pub fn to_flat_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .flat_map(|(field, errors)| errors.iter().map(move |e| format!("{}: {}", field, e)))
            .collect()
    }

    /// `Ok(())` when empty, otherwise a validation error carrying every message.
    pub fn into_result(self) -> crate::error::Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.into())
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_flat_messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationErrors> for CadenceError {
    fn from(errors: ValidationErrors) -> Self {
        let only_email = !errors.errors.is_empty()
            && errors
                .errors
                .values()
                .flatten()
                .all(|e| e.kind == ValidationErrorKind::InvalidEmail);
        let code = if only_email {
            ErrorCode::InvalidEmail
        } else {
            ErrorCode::ValidationError
        };
        CadenceError::new(code, format!("Validation failed: {}", errors))
            .with_context("fields", &errors.errors)
    }
}
