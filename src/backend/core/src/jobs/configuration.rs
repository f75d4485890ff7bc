//! Typed, validated execution parameters for a job.
//!
//! A [`JobConfiguration`] is immutable: every `with_*` method returns a new,
//! re-validated value and leaves the original untouched.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::execution::ExecutionStatus;
use crate::error::{CadenceError, Result};
use crate::validation::{
    check, Email, OneOf, Required, UrlFormat, ValidationErrorKind, ValidationErrors,
};

/// Default timeout for HTTP jobs built with [`JobConfiguration::http_request`].
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Default timeout for command and script jobs.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

// ═══════════════════════════════════════════════════════════════════════════════
// Job Kind
// ═══════════════════════════════════════════════════════════════════════════════

/// Discriminant of [`JobKind`], used for routing and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    HttpRequest,
    Command,
    Script,
    StoredProcedure,
    EmailAlert,
    DataSync,
    FileProcess,
    Custom,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HttpRequest => "http_request",
            Self::Command => "command",
            Self::Script => "script",
            Self::StoredProcedure => "stored_procedure",
            Self::EmailAlert => "email_alert",
            Self::DataSync => "data_sync",
            Self::FileProcess => "file_process",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// What a job does, with exactly the fields that kind needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    HttpRequest {
        url: String,
        #[serde(default = "default_http_method")]
        method: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    Script {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interpreter: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
    StoredProcedure {
        procedure: String,
        connection: String,
    },
    EmailAlert {
        recipients: Vec<Email>,
        subject: String,
    },
    DataSync {
        source: String,
        destination: String,
    },
    FileProcess {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    Custom {
        handler: String,
    },
}

fn default_http_method() -> String {
    "GET".to_string()
}

impl JobKind {
    pub fn job_type(&self) -> JobType {
        match self {
            Self::HttpRequest { .. } => JobType::HttpRequest,
            Self::Command { .. } => JobType::Command,
            Self::Script { .. } => JobType::Script,
            Self::StoredProcedure { .. } => JobType::StoredProcedure,
            Self::EmailAlert { .. } => JobType::EmailAlert,
            Self::DataSync { .. } => JobType::DataSync,
            Self::FileProcess { .. } => JobType::FileProcess,
            Self::Custom { .. } => JobType::Custom,
        }
    }

    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        match self {
            Self::HttpRequest { url, method, .. } => {
                check(&mut errors, "url", url.as_str(), UrlFormat);
                check(&mut errors, "method", method.as_str(), OneOf(HTTP_METHODS));
            }
            Self::Command { command, .. } => {
                check(&mut errors, "command", command.as_str(), Required);
            }
            Self::Script { path, .. } | Self::FileProcess { path, .. } => {
                if path.as_os_str().is_empty() {
                    errors.add_error("path", ValidationErrorKind::Required);
                }
            }
            Self::StoredProcedure { procedure, connection } => {
                check(&mut errors, "procedure", procedure.as_str(), Required);
                check(&mut errors, "connection", connection.as_str(), Required);
            }
            Self::EmailAlert { recipients, subject } => {
                check(&mut errors, "recipients", recipients.as_slice(), Required);
                check(&mut errors, "subject", subject.as_str(), Required);
            }
            Self::DataSync { source, destination } => {
                check(&mut errors, "source", source.as_str(), Required);
                check(&mut errors, "destination", destination.as_str(), Required);
            }
            Self::Custom { handler } => {
                check(&mut errors, "handler", handler.as_str(), Required);
            }
        }
        errors
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Notification Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Who to tell about which outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
    #[serde(default)]
    pub on_failure: bool,
    #[serde(default)]
    pub on_success: bool,
}

impl NotificationPolicy {
    /// Notify `email` on failure only.
    pub fn failures_to(email: Email) -> Self {
        Self {
            email: Some(email),
            on_failure: true,
            on_success: false,
        }
    }

    /// Whether an execution that ended in `status` should produce a notification.
    pub fn applies_to(&self, status: ExecutionStatus) -> bool {
        if self.email.is_none() {
            return false;
        }
        match status {
            ExecutionStatus::Completed => self.on_success,
            ExecutionStatus::Failed | ExecutionStatus::Timeout => self.on_failure,
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable execution parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawJobConfiguration")]
pub struct JobConfiguration {
    kind: JobKind,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    parameters: BTreeMap<String, serde_json::Value>,
    #[serde(with = "humantime_serde")]
    timeout: Option<Duration>,
    max_retries: u32,
    allow_concurrent: bool,
    notification: NotificationPolicy,
}

/// Unvalidated wire shape; every deserialized configuration passes through `create`.
#[derive(Deserialize)]
struct RawJobConfiguration {
    kind: JobKind,
    #[serde(default)]
    parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default)]
    max_retries: u32,
    #[serde(default)]
    allow_concurrent: bool,
    #[serde(default)]
    notification: NotificationPolicy,
}

impl TryFrom<RawJobConfiguration> for JobConfiguration {
    type Error = CadenceError;

    fn try_from(raw: RawJobConfiguration) -> Result<Self> {
        let config = Self {
            kind: raw.kind,
            parameters: raw.parameters,
            timeout: raw.timeout,
            max_retries: raw.max_retries,
            allow_concurrent: raw.allow_concurrent,
            notification: raw.notification,
        };
        config.validate()?;
        Ok(config)
    }
}

impl JobConfiguration {
    // ─────────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────────

    /// Build and validate a configuration.
    ///
    /// A notification address, when given, enables failure notifications.
    pub fn create(
        kind: JobKind,
        parameters: BTreeMap<String, serde_json::Value>,
        timeout: Option<Duration>,
        max_retries: u32,
        allow_concurrent: bool,
        notify_email: Option<&str>,
    ) -> Result<Self> {
        let notification = match notify_email {
            Some(address) => NotificationPolicy::failures_to(Email::parse(address)?),
            None => NotificationPolicy::default(),
        };
        let config = Self {
            kind,
            parameters,
            timeout,
            max_retries,
            allow_concurrent,
            notification,
        };
        config.validate()?;
        Ok(config)
    }

    /// Configuration with defaults for everything except the kind.
    pub fn new(kind: JobKind) -> Result<Self> {
        Self::create(kind, BTreeMap::new(), None, 0, false, None)
    }

    /// HTTP call with a five minute timeout.
    pub fn http_request(url: impl Into<String>, method: impl Into<String>) -> Result<Self> {
        let kind = JobKind::HttpRequest {
            url: url.into(),
            method: method.into().to_ascii_uppercase(),
            headers: BTreeMap::new(),
            body: None,
        };
        Self::new(kind)?.with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Shell command with a thirty minute timeout.
    pub fn command(command: impl Into<String>) -> Result<Self> {
        let kind = JobKind::Command {
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        };
        Self::new(kind)?.with_timeout(DEFAULT_PROCESS_TIMEOUT)
    }

    /// Script file with a thirty minute timeout.
    pub fn script(path: impl Into<PathBuf>) -> Result<Self> {
        let kind = JobKind::Script {
            path: path.into(),
            interpreter: None,
            args: Vec::new(),
        };
        Self::new(kind)?.with_timeout(DEFAULT_PROCESS_TIMEOUT)
    }

    fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();
        errors.merge_with_prefix("kind", self.kind.validate());
        if self.timeout.is_some_and(|t| t.is_zero()) {
            errors.add_error("timeout", ValidationErrorKind::NotPositive);
        }
        if (self.notification.on_failure || self.notification.on_success)
            && self.notification.email.is_none()
        {
            errors.add_error("notification.email", ValidationErrorKind::Required);
        }
        errors.into_result()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Derived copies
    // ─────────────────────────────────────────────────────────────────────────

    pub fn with_parameter(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let mut next = self.clone();
        next.parameters.insert(key.into(), value.into());
        next
    }

    /// Copy with a new timeout; zero is rejected.
    pub fn with_timeout(&self, timeout: Duration) -> Result<Self> {
        let mut next = self.clone();
        next.timeout = Some(timeout);
        next.validate()?;
        Ok(next)
    }

    pub fn without_timeout(&self) -> Self {
        let mut next = self.clone();
        next.timeout = None;
        next
    }

    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        let mut next = self.clone();
        next.max_retries = max_retries;
        next
    }

    pub fn with_allow_concurrent(&self, allow_concurrent: bool) -> Self {
        let mut next = self.clone();
        next.allow_concurrent = allow_concurrent;
        next
    }

    /// Copy that notifies `address` about failures (and successes if already enabled).
    pub fn with_notification(&self, address: &str) -> Result<Self> {
        let mut next = self.clone();
        next.notification.email = Some(Email::parse(address)?);
        next.notification.on_failure = true;
        Ok(next)
    }

    pub fn with_success_notification(&self, enabled: bool) -> Result<Self> {
        let mut next = self.clone();
        next.notification.on_success = enabled;
        next.validate()?;
        Ok(next)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn job_type(&self) -> JobType {
        self.kind.job_type()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn allow_concurrent(&self) -> bool {
        self.allow_concurrent
    }

    pub fn notification(&self) -> &NotificationPolicy {
        &self.notification
    }

    pub fn notify_email(&self) -> Option<&Email> {
        self.notification.email.as_ref()
    }

    pub fn parameters(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.parameters
    }

    pub fn has_parameter(&self, key: &str) -> bool {
        self.parameters.contains_key(key)
    }

    /// Typed parameter lookup.
    ///
    /// Returns `None` when the key is missing or no conversion works. A string value is
    /// also tried as JSON (`"30"` reads as `30`), and a scalar is also tried as its
    /// string form (`30` reads as `"30"`).
    pub fn parameter<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        lenient_read(self.parameters.get(key)?)
    }

    pub fn parameter_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.parameter(key).unwrap_or(default)
    }
}

/// Deserialize `value` as `T`, falling back to string/JSON reinterpretation.
pub(crate) fn lenient_read<T: DeserializeOwned>(value: &serde_json::Value) -> Option<T> {
    if let Ok(typed) = serde_json::from_value(value.clone()) {
        return Some(typed);
    }
    match value {
        serde_json::Value::String(text) => serde_json::from_str(text).ok(),
        serde_json::Value::Number(_) | serde_json::Value::Bool(_) => {
            serde_json::from_value(serde_json::Value::String(value.to_string())).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_http_defaults() {
        let config = JobConfiguration::http_request("https://example.com/ping", "post").unwrap();
        assert_eq!(config.job_type(), JobType::HttpRequest);
        assert_eq!(config.timeout(), Some(DEFAULT_HTTP_TIMEOUT));
        assert!(matches!(config.kind(), JobKind::HttpRequest { method, .. } if method == "POST"));
    }

    #[test]
    fn test_command_and_script_defaults() {
        assert_eq!(
            JobConfiguration::command("echo hi").unwrap().timeout(),
            Some(DEFAULT_PROCESS_TIMEOUT)
        );
        assert_eq!(
            JobConfiguration::script("/opt/jobs/cleanup.sh").unwrap().timeout(),
            Some(DEFAULT_PROCESS_TIMEOUT)
        );
    }

    #[test]
    fn test_rejects_invalid_kind_fields() {
        let err = JobConfiguration::http_request("not a url", "GET").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(JobConfiguration::command("   ").is_err());
        assert!(JobConfiguration::http_request("https://x.io", "BREW").is_err());
    }

    #[test]
    fn test_rejects_zero_timeout_without_mutating() {
        let config = JobConfiguration::command("true").unwrap();
        assert!(config.with_timeout(Duration::ZERO).is_err());
        assert_eq!(config.timeout(), Some(DEFAULT_PROCESS_TIMEOUT));
    }

    #[test]
    fn test_rejects_invalid_email() {
        let kind = JobKind::Custom {
            handler: "noop".into(),
        };
        let err = JobConfiguration::create(kind, BTreeMap::new(), None, 0, false, Some("nope"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidEmail);
    }

    #[test]
    fn test_with_methods_return_new_values() {
        let base = JobConfiguration::command("true").unwrap();
        let changed = base.with_parameter("batch", 10).with_max_retries(3);
        assert!(!base.has_parameter("batch"));
        assert_eq!(base.max_retries(), 0);
        assert_eq!(changed.parameter::<u32>("batch"), Some(10));
        assert_eq!(changed.max_retries(), 3);
    }

    #[test]
    fn test_lenient_parameter_lookup() {
        let config = JobConfiguration::command("true")
            .unwrap()
            .with_parameter("limit", "25")
            .with_parameter("port", 8080)
            .with_parameter("enabled", "true")
            .with_parameter("tags", json!(["a", "b"]));

        assert_eq!(config.parameter::<u32>("limit"), Some(25));
        assert_eq!(config.parameter::<String>("port"), Some("8080".to_string()));
        assert_eq!(config.parameter::<bool>("enabled"), Some(true));
        assert_eq!(config.parameter::<Vec<String>>("tags"), Some(vec!["a".into(), "b".into()]));
        assert_eq!(config.parameter::<u32>("tags"), None);
        assert_eq!(config.parameter::<u32>("missing"), None);
        assert_eq!(config.parameter_or("missing", 7u32), 7);
    }

    #[test]
    fn test_notification_policy() {
        let config = JobConfiguration::command("true")
            .unwrap()
            .with_notification("Ops@Example.com")
            .unwrap();
        let policy = config.notification();
        assert_eq!(config.notify_email().map(|e| e.as_str()), Some("ops@example.com"));
        assert!(policy.applies_to(ExecutionStatus::Failed));
        assert!(policy.applies_to(ExecutionStatus::Timeout));
        assert!(!policy.applies_to(ExecutionStatus::Completed));
        assert!(!policy.applies_to(ExecutionStatus::Skipped));

        let both = config.with_success_notification(true).unwrap();
        assert!(both.notification().applies_to(ExecutionStatus::Completed));

        let no_email = JobConfiguration::command("true").unwrap();
        assert!(no_email.with_success_notification(true).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: JobConfiguration = serde_json::from_value(json!({
            "kind": { "type": "command", "command": "backup.sh" },
            "timeout": "15m",
            "max_retries": 2
        }))
        .unwrap();
        assert_eq!(ok.timeout(), Some(Duration::from_secs(900)));
        assert_eq!(ok.max_retries(), 2);

        let bad = serde_json::from_value::<JobConfiguration>(json!({
            "kind": { "type": "http_request", "url": "nowhere" }
        }));
        assert!(bad.is_err());

        let negative = serde_json::from_value::<JobConfiguration>(json!({
            "kind": { "type": "custom", "handler": "x" },
            "max_retries": -1
        }));
        assert!(negative.is_err());
    }
}
