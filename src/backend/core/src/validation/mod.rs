//! Input validation for job definitions.
//!
//! - **Rules**: small reusable checks ([`Required`], [`MaxLength`], [`EmailFormat`],
//!   [`UrlFormat`], [`OneOf`]) implementing [`ValidationRule`]
//! - **Errors**: [`ValidationErrors`] collects field-level failures and converts into a
//!   single `ValidationError`/`InvalidEmail` [`CadenceError`](crate::error::CadenceError)
//! - **Email**: the [`Email`] value object used for notification targets
//!
//! Validation never partially applies: callers build the complete new value, validate
//! it, and only then swap it in.

pub mod email;
pub mod error;
pub mod rules;

pub use email::Email;
pub use error::{FieldError, ValidationErrorKind, ValidationErrors};
pub use rules::{EmailFormat, MaxLength, OneOf, Required, UrlFormat, ValidationRule};

/// Apply `rule` to `value`, recording any failure under `field`.
pub fn check<T: ?Sized, R: ValidationRule<T>>(
    errors: &mut ValidationErrors,
    field: &str,
    value: &T,
    rule: R,
) {
    if let Some(error) = rule.validate(value) {
        errors.add(field, error);
    }
}
