//! Structured logging with JSON/pretty formats and redaction of personal data.
//!
//! - JSON format for production environments
//! - Pretty format for development
//! - Per-module log level configuration
//! - Redaction of notification addresses and credentials embedded in job targets

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{LazyLock, OnceLock};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Global redactor instance.
static REDACTOR: OnceLock<SensitiveFieldRedactor> = OnceLock::new();

static EMAIL_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("Invalid email value regex")
});

static URL_CREDENTIALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(https?://)[^/@\s]+@").expect("Invalid URL credentials regex"));

static QUERY_SECRETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([?&](?:access_token|token|api_key|apikey|key|secret|password|sig|signature)=)[^&#\s]*")
        .expect("Invalid query secrets regex")
});

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// Whether to include file/line information
    #[serde(default = "default_include_location")]
    pub include_location: bool,

    /// Whether to include target (module path)
    #[serde(default = "default_include_target")]
    pub include_target: bool,

    /// Emit an event when spans close (gives per-execution timings)
    #[serde(default)]
    pub span_close_events: bool,

    /// Redaction configuration
    #[serde(default)]
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: default_include_location(),
            include_target: default_include_target(),
            span_close_events: false,
            redaction: RedactionConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format for production/structured logging
    #[default]
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact single-line format
    Compact,
}

/// Configuration for sensitive data redaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Whether redaction is enabled
    #[serde(default = "default_redaction_enabled")]
    pub enabled: bool,

    /// Field names whose values are always replaced (case-insensitive substring match)
    #[serde(default = "default_redacted_fields")]
    pub field_names: Vec<String>,

    /// Replacement text for redacted values
    #[serde(default = "default_redaction_replacement")]
    pub replacement: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: default_redaction_enabled(),
            field_names: default_redacted_fields(),
            replacement: default_redaction_replacement(),
        }
    }
}

/// Redactor for sensitive fields in log output.
#[derive(Debug, Clone)]
pub struct SensitiveFieldRedactor {
    field_names: Vec<String>,
    replacement: String,
    enabled: bool,
}

impl SensitiveFieldRedactor {
    /// Create a new redactor from configuration.
    pub fn new(config: &RedactionConfig) -> Self {
        Self {
            field_names: config.field_names.iter().map(|s| s.to_lowercase()).collect(),
            replacement: config.replacement.clone(),
            enabled: config.enabled,
        }
    }

    /// Check if a field name should be redacted.
    pub fn should_redact_field(&self, field_name: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let lower = field_name.to_lowercase();
        self.field_names.iter().any(|f| lower.contains(f))
    }

    /// Redact email addresses, URL userinfo and secret query parameters inside a
    /// free-form value.
    pub fn redact_value(&self, value: &str) -> String {
        if !self.enabled {
            return value.to_string();
        }

        let userinfo = format!("${{1}}{}@", self.replacement);
        let query = format!("${{1}}{}", self.replacement);
        let without_credentials = URL_CREDENTIALS.replace_all(value, userinfo.as_str());
        let without_secrets = QUERY_SECRETS.replace_all(&without_credentials, query.as_str());
        EMAIL_VALUE
            .replace_all(&without_secrets, self.replacement.as_str())
            .into_owned()
    }

    /// Redact a field value, checking both field name and value patterns.
    pub fn redact(&self, field_name: &str, value: &str) -> String {
        if self.should_redact_field(field_name) {
            return self.replacement.clone();
        }

        self.redact_value(value)
    }

    /// Get the global redactor instance.
    pub fn global() -> &'static SensitiveFieldRedactor {
        REDACTOR.get_or_init(|| SensitiveFieldRedactor::new(&RedactionConfig::default()))
    }
}

/// Redact a value with the global redactor.
pub fn redact(value: &str) -> String {
    SensitiveFieldRedactor::global().redact_value(value)
}

// Default value functions
fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_include_location() -> bool {
    true
}

fn default_include_target() -> bool {
    true
}

fn default_redaction_enabled() -> bool {
    true
}

fn default_redaction_replacement() -> String {
    "[REDACTED]".to_string()
}

fn default_redacted_fields() -> Vec<String> {
    vec![
        "email".to_string(),
        "password".to_string(),
        "secret".to_string(),
        "token".to_string(),
        "authorization".to_string(),
    ]
}

/// Initialize the logging subsystem.
///
/// # Errors
///
/// Returns an error if the filter directives are invalid or a global subscriber
/// has already been installed.
pub fn init_logging(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    let _ = REDACTOR.set(SensitiveFieldRedactor::new(&config.redaction));

    let mut filter = EnvFilter::try_new(&config.level)?;
    for (module, level) in &config.module_levels {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(directive.parse()?);
    }

    // In development, prefer pretty format unless explicitly set
    let format = if environment == "development" && config.format == LogFormat::Json {
        &LogFormat::Pretty
    } else {
        &config.format
    };

    let span_events = if config.span_close_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_span_events(span_events)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_email_in_value() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());
        assert_eq!(
            redactor.redact_value("notify ops@example.com on failure"),
            "notify [REDACTED] on failure"
        );
    }

    #[test]
    fn test_redacts_url_credentials() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());
        assert_eq!(
            redactor.redact_value("https://user:pw@api.example.com/hook"),
            "https://[REDACTED]@api.example.com/hook"
        );
    }

    #[test]
    fn test_redacts_secret_query_parameters() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());
        assert_eq!(
            redactor.redact_value("GET https://api.example.com/v1?region=eu&API_KEY=abc123&token=t0k#top"),
            "GET https://api.example.com/v1?region=eu&API_KEY=[REDACTED]&token=[REDACTED]#top"
        );
        assert_eq!(redactor.redact_value("https://example.com/?keyword=x"), "https://example.com/?keyword=x");
    }

    #[test]
    fn test_redacts_by_field_name() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());
        assert!(redactor.should_redact_field("notification_email"));
        assert_eq!(redactor.redact("api_token", "abc"), "[REDACTED]");
        assert_eq!(redactor.redact("job_name", "nightly"), "nightly");
    }

    #[test]
    fn test_disabled_redaction_passes_through() {
        let config = RedactionConfig {
            enabled: false,
            ..RedactionConfig::default()
        };
        let redactor = SensitiveFieldRedactor::new(&config);
        assert_eq!(redactor.redact("email", "a@b.io"), "a@b.io");
    }
}
