//! Structured error handling for Cadence.
//!
//! This module provides:
//! - A single error type carrying a stable, machine-readable [`ErrorCode`]
//! - Severity, retryability and category classification per code
//! - An HTTP-style status number so an API layer can translate errors
//! - Error chaining with context and structured details
//! - Metrics integration for error tracking
//!
//! Execution failures (a job's own work failing) are *not* errors in this sense:
//! they are a normal terminal state of an execution and never surface here.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cadence_core::error::{CadenceError, ErrorContext, Result};
//!
//! fn load() -> Result<String> {
//!     std::fs::read_to_string("jobs.toml").context("Failed to read job definitions")
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Cadence operations.
pub type Result<T> = std::result::Result<T, CadenceError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by callers for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Schedule Errors (1000-1099)
    InvalidSchedule,

    // Job / Execution Errors (1100-1199)
    JobNotFound,
    ExecutionNotFound,
    InvalidStateTransition,
    ConcurrencyConflict,

    // Runner / Notification Errors (1200-1299)
    RunnerError,
    RunnerUnavailable,
    NotificationFailed,

    // Storage Errors (2000-2099)
    StorageError,
    StorageUnavailable,
    DuplicateRecord,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,

    // External Service Errors (3000-3099)
    HttpRequestFailed,
    NetworkError,

    // Validation Errors (4100-4199)
    ValidationError,
    InvalidInput,
    MissingRequiredField,
    InvalidEmail,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
    UnknownError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::InvalidSchedule => 1000,

            Self::JobNotFound => 1100,
            Self::ExecutionNotFound => 1101,
            Self::InvalidStateTransition => 1102,
            Self::ConcurrencyConflict => 1103,

            Self::RunnerError => 1200,
            Self::RunnerUnavailable => 1201,
            Self::NotificationFailed => 1202,

            Self::StorageError => 2000,
            Self::StorageUnavailable => 2001,
            Self::DuplicateRecord => 2002,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,

            Self::HttpRequestFailed => 3000,
            Self::NetworkError => 3001,

            Self::ValidationError => 4100,
            Self::InvalidInput => 4101,
            Self::MissingRequiredField => 4102,
            Self::InvalidEmail => 4103,

            Self::ConfigurationError => 5000,
            Self::InvalidConfiguration => 5001,

            Self::InternalError => 9000,
            Self::UnknownError => 9099,
        }
    }

    /// HTTP-style status number an API layer should answer with.
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::JobNotFound | Self::ExecutionNotFound => 404,

            Self::InvalidStateTransition | Self::ConcurrencyConflict | Self::DuplicateRecord => 409,

            Self::InvalidSchedule
            | Self::ValidationError
            | Self::InvalidInput
            | Self::MissingRequiredField
            | Self::InvalidEmail => 422,

            Self::StorageUnavailable | Self::RunnerUnavailable => 503,

            Self::HttpRequestFailed | Self::NetworkError => 502,

            Self::RunnerError
            | Self::NotificationFailed
            | Self::StorageError
            | Self::SerializationError
            | Self::DeserializationError
            | Self::ConfigurationError
            | Self::InvalidConfiguration
            | Self::InternalError
            | Self::UnknownError => 500,
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable
                | Self::RunnerUnavailable
                | Self::ConcurrencyConflict
                | Self::HttpRequestFailed
                | Self::NetworkError
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "schedule",
            1100..=1199 => "job",
            1200..=1299 => "execution",
            2000..=2099 => "storage",
            2200..=2299 => "serialization",
            3000..=3099 => "external_service",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad input, unknown identifiers)
    Low,
    /// Operational issues (conflicts, unavailable collaborators)
    Medium,
    /// System errors (storage failures, coordinator bugs)
    High,
    /// Critical errors requiring immediate attention
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::InvalidSchedule
            | ErrorCode::JobNotFound
            | ErrorCode::ExecutionNotFound
            | ErrorCode::ValidationError
            | ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::InvalidEmail
            | ErrorCode::DuplicateRecord => Self::Low,

            ErrorCode::ConcurrencyConflict
            | ErrorCode::RunnerUnavailable
            | ErrorCode::NotificationFailed
            | ErrorCode::HttpRequestFailed
            | ErrorCode::NetworkError => Self::Medium,

            // Invalid transitions indicate a coordinator bug, so they are surfaced loudly.
            ErrorCode::InvalidStateTransition
            | ErrorCode::RunnerError
            | ErrorCode::StorageError
            | ErrorCode::SerializationError
            | ErrorCode::DeserializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::StorageUnavailable | ErrorCode::InternalError | ErrorCode::UnknownError => {
                Self::Critical
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (job, execution, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Suggested action for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Cadence.
#[derive(Error, Debug)]
pub struct CadenceError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-facing error message
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for CadenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl CadenceError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    /// True for unknown job/execution identifiers.
    pub fn is_not_found(&self) -> bool {
        matches!(self.code, ErrorCode::JobNotFound | ErrorCode::ExecutionNotFound)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error at a level derived from its severity.
    pub fn log(&self) {
        let severity = self.severity();
        match severity {
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %self.code,
                    category = self.code.category(),
                    message = %self.user_message,
                    "Caller error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %self.code,
                    category = self.code.category(),
                    message = %self.user_message,
                    internal = ?self.internal_message,
                    "Operational error"
                );
            }
            ErrorSeverity::High | ErrorSeverity::Critical => {
                error!(
                    error_code = %self.code,
                    category = self.code.category(),
                    severity = ?severity,
                    message = %self.user_message,
                    internal = ?self.internal_message,
                    source = ?self.source.as_ref().map(|s| s.to_string()),
                    "System error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "cadence_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializable error body for whatever API layer fronts the engine.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code
    pub code: ErrorCode,
    /// Numeric code
    pub numeric_code: u32,
    /// User-facing message
    pub message: String,
    /// HTTP-style status number
    pub status: u16,
    /// Whether the caller may retry
    pub retryable: bool,
    /// Structured details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

impl From<&CadenceError> for ErrorResponse {
    fn from(error: &CadenceError) -> Self {
        let details = error.details();
        let has_details = !details.context.is_empty()
            || details.entity_id.is_some()
            || details.suggested_action.is_some();

        Self {
            code: error.code(),
            numeric_code: error.code().numeric_code(),
            message: error.user_message().to_string(),
            status: error.http_status(),
            retryable: error.is_retryable(),
            details: has_details.then(|| details.clone()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to results.
pub trait ErrorContext<T> {
    /// Add context message to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Convert to a specific error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| CadenceError::internal(message).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| CadenceError::with_internal(code, code.to_string(), e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| CadenceError::internal(message))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| CadenceError::new(code, code.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for CadenceError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_data() || error.is_syntax() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };
        CadenceError::with_internal(code, "Failed to process JSON data", error.to_string()).with_source(error)
    }
}

impl From<std::io::Error> for CadenceError {
    fn from(error: std::io::Error) -> Self {
        CadenceError::with_internal(ErrorCode::InternalError, "I/O operation failed", error.to_string())
            .with_source(error)
    }
}

impl From<reqwest::Error> for CadenceError {
    fn from(error: reqwest::Error) -> Self {
        let code = if error.is_connect() || error.is_timeout() {
            ErrorCode::NetworkError
        } else {
            ErrorCode::HttpRequestFailed
        };
        CadenceError::with_internal(code, "HTTP request failed", error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for CadenceError {
    fn from(error: anyhow::Error) -> Self {
        CadenceError::internal(format!("{:#}", error))
    }
}

impl From<config::ConfigError> for CadenceError {
    fn from(error: config::ConfigError) -> Self {
        CadenceError::with_internal(ErrorCode::ConfigurationError, "Configuration error", error.to_string())
            .with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Domain-Specific Constructors
// ═══════════════════════════════════════════════════════════════════════════════

impl CadenceError {
    /// A cron expression failed to parse.
    pub fn invalid_schedule(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        let expression = expression.into();
        let reason = reason.into();
        Self::new(
            ErrorCode::InvalidSchedule,
            format!("Invalid cron expression '{}': {}", expression, reason),
        )
        .with_details(
            ErrorDetails::new()
                .with_context("expression", &expression)
                .with_suggestion("Use 5 fields (minute hour day month weekday) or 6 with leading seconds"),
        )
    }

    pub fn job_not_found(job_id: impl fmt::Display) -> Self {
        let id = job_id.to_string();
        Self::new(ErrorCode::JobNotFound, format!("Job not found: {}", id))
            .with_details(ErrorDetails::new().with_entity("job", id))
    }

    pub fn execution_not_found(execution_id: impl fmt::Display) -> Self {
        let id = execution_id.to_string();
        Self::new(ErrorCode::ExecutionNotFound, format!("Execution not found: {}", id))
            .with_details(ErrorDetails::new().with_entity("execution", id))
    }

    /// An operation is not legal from the entity's current state.
    pub fn invalid_state_transition(
        entity: &'static str,
        from: impl fmt::Display,
        action: &'static str,
    ) -> Self {
        let from = from.to_string();
        Self::new(
            ErrorCode::InvalidStateTransition,
            format!("Cannot {} {} in state {}", action, entity, from),
        )
        .with_details(
            ErrorDetails::new()
                .with_context("entity", entity)
                .with_context("from", &from)
                .with_context("action", action),
        )
    }

    pub fn invalid_email(address: impl Into<String>) -> Self {
        let address = address.into();
        Self::new(ErrorCode::InvalidEmail, "Invalid notification email address")
            .with_internal_message(format!("rejected address of {} chars", address.chars().count()))
    }

    pub fn missing_field(field: &'static str) -> Self {
        Self::new(ErrorCode::MissingRequiredField, format!("Missing required field: {}", field))
            .with_context("field", field)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::StorageError, "Storage operation failed", message)
    }

    pub fn runner(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::RunnerError, "Job runner failed", message)
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::NotificationFailed, "Notification delivery failed", message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InvalidConfiguration, "Invalid configuration", message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::JobNotFound.http_status(), 404);
        assert_eq!(ErrorCode::ExecutionNotFound.http_status(), 404);
        assert_eq!(ErrorCode::InvalidStateTransition.http_status(), 409);
        assert_eq!(ErrorCode::InvalidSchedule.http_status(), 422);
        assert_eq!(ErrorCode::StorageUnavailable.http_status(), 503);
        assert_eq!(ErrorCode::InternalError.http_status(), 500);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::InvalidSchedule.category(), "schedule");
        assert_eq!(ErrorCode::JobNotFound.category(), "job");
        assert_eq!(ErrorCode::StorageError.category(), "storage");
        assert_eq!(ErrorCode::InvalidEmail.category(), "validation");
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::StorageUnavailable.is_retryable());
        assert!(ErrorCode::NetworkError.is_retryable());
        assert!(!ErrorCode::ValidationError.is_retryable());
        assert!(!ErrorCode::InvalidStateTransition.is_retryable());
    }

    #[test]
    fn test_not_found_constructors() {
        let err = CadenceError::job_not_found("abc");
        assert!(err.is_not_found());
        assert_eq!(err.details().entity_type.as_deref(), Some("job"));
        assert_eq!(err.details().entity_id.as_deref(), Some("abc"));

        let err = CadenceError::execution_not_found("xyz");
        assert_eq!(err.code(), ErrorCode::ExecutionNotFound);
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = CadenceError::invalid_state_transition("execution", "pending", "complete");
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
        assert_eq!(err.user_message(), "Cannot complete execution in state pending");
        assert_eq!(err.severity(), ErrorSeverity::High);
    }

    #[test]
    fn test_invalid_email_does_not_leak_address() {
        let err = CadenceError::invalid_email("not-an-address");
        assert!(!err.to_string().contains("not-an-address"));
    }

    #[test]
    fn test_error_context() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let err = result.context("loading jobs").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(err.internal_message(), Some("loading jobs"));

        let none: Option<u32> = None;
        let err = none.with_error_code(ErrorCode::JobNotFound).unwrap_err();
        assert_eq!(err.code(), ErrorCode::JobNotFound);
    }

    #[test]
    fn test_error_response() {
        let err = CadenceError::job_not_found("j-1");
        let response = ErrorResponse::from(&err);
        assert_eq!(response.status, 404);
        assert_eq!(response.numeric_code, 1100);
        assert!(response.details.is_some());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], "JOB_NOT_FOUND");
    }

    #[test]
    fn test_error_display() {
        let err = CadenceError::with_internal(ErrorCode::StorageError, "Save failed", "disk full");
        assert_eq!(err.to_string(), "[StorageError] Save failed (internal: disk full)");
    }
}
