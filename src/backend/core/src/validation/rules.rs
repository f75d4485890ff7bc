//! Reusable validation rules.

use regex::Regex;
use std::sync::LazyLock;

use super::error::{FieldError, ValidationErrorKind};

// ═══════════════════════════════════════════════════════════════════════════════
// Pre-compiled Regex Patterns
// ═══════════════════════════════════════════════════════════════════════════════

/// Email validation regex.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("Invalid email regex")
});

/// HTTP(S) URL validation regex.
static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("Invalid URL regex")
});

// ═══════════════════════════════════════════════════════════════════════════════
// Validation Rule Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// A validation rule that can be applied to a value.
pub trait ValidationRule<T: ?Sized> {
    /// Validate the value and return any error.
    fn validate(&self, value: &T) -> Option<FieldError>;
}

/// Non-empty after trimming.
#[derive(Debug, Clone)]
pub struct Required;

impl ValidationRule<str> for Required {
    fn validate(&self, value: &str) -> Option<FieldError> {
        value
            .trim()
            .is_empty()
            .then(|| FieldError::new(ValidationErrorKind::Required))
    }
}

impl<T> ValidationRule<[T]> for Required {
    fn validate(&self, value: &[T]) -> Option<FieldError> {
        value
            .is_empty()
            .then(|| FieldError::new(ValidationErrorKind::Required))
    }
}

/// At most `n` characters.
#[derive(Debug, Clone)]
pub struct MaxLength(pub usize);

impl ValidationRule<str> for MaxLength {
    fn validate(&self, value: &str) -> Option<FieldError> {
        let actual = value.chars().count();
        (actual > self.0).then(|| {
            FieldError::new(ValidationErrorKind::MaxLength {
                max: self.0,
                actual,
            })
        })
    }
}

/// Syntactically valid e-mail address.
#[derive(Debug, Clone)]
pub struct EmailFormat;

impl ValidationRule<str> for EmailFormat {
    fn validate(&self, value: &str) -> Option<FieldError> {
        (!EMAIL_REGEX.is_match(value)).then(|| FieldError::new(ValidationErrorKind::InvalidEmail))
    }
}

/// Absolute `http`/`https` URL.
#[derive(Debug, Clone)]
pub struct UrlFormat;

impl ValidationRule<str> for UrlFormat {
    fn validate(&self, value: &str) -> Option<FieldError> {
        (!URL_REGEX.is_match(value)).then(|| FieldError::new(ValidationErrorKind::InvalidUrl))
    }
}

/// Value drawn from a fixed set (case-insensitive).
#[derive(Debug, Clone)]
pub struct OneOf(pub &'static [&'static str]);

impl ValidationRule<str> for OneOf {
    fn validate(&self, value: &str) -> Option<FieldError> {
        (!self.0.iter().any(|allowed| allowed.eq_ignore_ascii_case(value))).then(|| {
            FieldError::new(ValidationErrorKind::NotInSet {
                allowed: self.0.iter().map(|s| s.to_string()).collect(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required() {
        assert!(ValidationRule::<str>::validate(&Required, "  ").is_some());
        assert!(ValidationRule::<str>::validate(&Required, "x").is_none());
        assert!(ValidationRule::<[u8]>::validate(&Required, &[]).is_some());
    }

    #[test]
    fn test_url_format() {
        assert!(UrlFormat.validate("https://example.com/hook").is_none());
        assert!(UrlFormat.validate("ftp://example.com").is_some());
        assert!(UrlFormat.validate("not a url").is_some());
    }

    #[test]
    fn test_one_of() {
        let methods = OneOf(&["GET", "POST"]);
        assert!(methods.validate("post").is_none());
        assert!(methods.validate("BREW").is_some());
    }

    #[test]
    fn test_max_length() {
        assert!(MaxLength(3).validate("abcd").is_some());
        assert!(MaxLength(4).validate("abcd").is_none());
    }
}
