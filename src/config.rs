//! Reporting configuration, resolved once at startup.
//!
//! Values come from, in increasing precedence:
//! 1. Built-in defaults
//! 2. A YAML file (see [`ReportingConfig::load_from_path`])
//! 3. `FAULT_REPORTER_*` environment variables
//!
//! Invalid values are rejected here so that nothing can fail for
//! configuration reasons while a fault is being handled.

use crate::domain::cadence::Cadence;
use crate::domain::report::ReportOptions;
use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "FAULT_REPORTER_";

/// Message produced by the runtime when a request body is over the upload limit.
pub const UPLOAD_SIZE_PATTERN: &str =
    r"^POST Content-Length of [0-9]+ bytes exceeds the limit of [0-9]+ bytes$";

/// What the controller does with captured faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingMode {
    /// Error handling is managed elsewhere; install nothing
    Disabled,
    /// Capture, log and notify; the end user only sees the fallback page
    #[default]
    LogOnly,
    /// Let the runtime print its own diagnostics
    DisplayOnly,
}

/// Reporting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub mode: ReportingMode,

    /// Log artifact; no persistence when unset
    pub log_path: Option<PathBuf>,

    /// Rotate once the artifact grows beyond this many bytes
    pub file_max_size: u64,

    /// Bytes dropped from the front of the artifact on rotation
    pub file_truncate_size: u64,

    /// Recipient of notifications; none are sent when unset
    pub notify_target: Option<String>,
    pub notify_sender: Option<String>,

    /// `-1` until cleared, `0` every error, `>0` minimum seconds between notifications
    pub notify_cadence_seconds: i64,

    pub include_ip: bool,
    pub include_user_agent: bool,

    /// Force-suppress the runtime's "request body too large" errors
    pub ignore_upload_size_errors: bool,

    pub terminate_on_notice: bool,
    pub terminate_on_strict: bool,
    pub terminate_on_deprecated: bool,

    /// Hand convertible runtime signals back to the host as typed errors
    pub convert_errors_to_exceptions: bool,

    /// Name used in notification subjects
    pub project_title: String,

    /// Prefix for request URLs in reports
    pub base_url: String,

    /// Operator console linked from notification bodies
    pub console_url: Option<String>,

    /// Drop records whose signature was already reported in this process
    pub dedup_signatures: bool,

    /// Upper bound on remembered signatures (least recently seen are forgotten)
    pub max_tracked_signatures: usize,

    /// Suppressed records start the notification window as if reported
    pub count_suppressed_as_reported: bool,

    /// Additional message patterns that force suppression
    pub suppress_patterns: Vec<String>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            mode: ReportingMode::LogOnly,
            log_path: None,
            file_max_size: 1_000_000,
            file_truncate_size: 20_000,
            notify_target: None,
            notify_sender: None,
            notify_cadence_seconds: 86_400,
            include_ip: true,
            include_user_agent: true,
            ignore_upload_size_errors: false,
            terminate_on_notice: false,
            terminate_on_strict: false,
            terminate_on_deprecated: false,
            convert_errors_to_exceptions: false,
            project_title: "Application".to_string(),
            base_url: String::new(),
            console_url: None,
            dedup_signatures: true,
            max_tracked_signatures: 10_000,
            count_suppressed_as_reported: false,
            suppress_patterns: Vec::new(),
        }
    }
}

impl ReportingConfig {
    pub fn builder() -> ReportingConfigBuilder {
        ReportingConfigBuilder::default()
    }

    /// Load from a YAML file layered over defaults, then apply environment
    /// overrides.
    ///
    /// # Errors
    /// `FileNotFound` if the file is missing, `Parsing` for malformed input,
    /// and any validation error.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        Self::from_figment(
            Figment::from(Serialized::defaults(ReportingConfig::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Load from defaults and environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(ReportingConfig::default()))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Extract and validate from a caller-assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Cadence::from_seconds(self.notify_cadence_seconds)?;

        if self.file_max_size == 0 {
            return Err(ConfigError::ZeroMaxSize);
        }
        if self.file_truncate_size >= self.file_max_size {
            return Err(ConfigError::TruncateNotBelowMax {
                truncate: self.file_truncate_size,
                max: self.file_max_size,
            });
        }
        if self.max_tracked_signatures == 0 {
            return Err(ConfigError::ZeroTrackedSignatures);
        }

        self.filters()?;
        Ok(())
    }

    pub fn cadence(&self) -> Result<Cadence, ConfigError> {
        Cadence::from_seconds(self.notify_cadence_seconds)
    }

    /// Compiled suppression filters, including the upload-size filter when enabled.
    pub fn filters(&self) -> Result<Vec<Regex>, ConfigError> {
        let mut filters = Vec::with_capacity(self.suppress_patterns.len() + 1);
        if self.ignore_upload_size_errors {
            filters.push(Regex::new(UPLOAD_SIZE_PATTERN)?);
        }
        for pattern in &self.suppress_patterns {
            filters.push(Regex::new(pattern)?);
        }
        Ok(filters)
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            base_url: self.base_url.clone(),
            include_ip: self.include_ip,
            include_user_agent: self.include_user_agent,
        }
    }
}

/// Builder for [`ReportingConfig`].
#[derive(Debug, Clone, Default)]
pub struct ReportingConfigBuilder {
    config: ReportingConfig,
}

impl ReportingConfigBuilder {
    pub fn with_mode(mut self, mode: ReportingMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = Some(path.into());
        self
    }

    /// Rotation bounds in bytes.
    pub fn with_file_sizes(mut self, max_size: u64, truncate_size: u64) -> Self {
        self.config.file_max_size = max_size;
        self.config.file_truncate_size = truncate_size;
        self
    }

    pub fn with_notify_target(mut self, target: impl Into<String>) -> Self {
        self.config.notify_target = Some(target.into());
        self
    }

    pub fn with_notify_sender(mut self, sender: impl Into<String>) -> Self {
        self.config.notify_sender = Some(sender.into());
        self
    }

    pub fn with_cadence_seconds(mut self, seconds: i64) -> Self {
        self.config.notify_cadence_seconds = seconds;
        self
    }

    /// Whether client IP and user agent appear in reports.
    pub fn with_client_details(mut self, include_ip: bool, include_user_agent: bool) -> Self {
        self.config.include_ip = include_ip;
        self.config.include_user_agent = include_user_agent;
        self
    }

    pub fn ignore_upload_size_errors(mut self, enabled: bool) -> Self {
        self.config.ignore_upload_size_errors = enabled;
        self
    }

    pub fn terminate_on_notice(mut self, enabled: bool) -> Self {
        self.config.terminate_on_notice = enabled;
        self
    }

    pub fn terminate_on_strict(mut self, enabled: bool) -> Self {
        self.config.terminate_on_strict = enabled;
        self
    }

    pub fn terminate_on_deprecated(mut self, enabled: bool) -> Self {
        self.config.terminate_on_deprecated = enabled;
        self
    }

    pub fn convert_errors_to_exceptions(mut self, enabled: bool) -> Self {
        self.config.convert_errors_to_exceptions = enabled;
        self
    }

    pub fn with_project_title(mut self, title: impl Into<String>) -> Self {
        self.config.project_title = title.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn with_console_url(mut self, url: impl Into<String>) -> Self {
        self.config.console_url = Some(url.into());
        self
    }

    pub fn dedup_signatures(mut self, enabled: bool) -> Self {
        self.config.dedup_signatures = enabled;
        self
    }

    pub fn with_max_tracked_signatures(mut self, max: usize) -> Self {
        self.config.max_tracked_signatures = max;
        self
    }

    pub fn count_suppressed_as_reported(mut self, enabled: bool) -> Self {
        self.config.count_suppressed_as_reported = enabled;
        self
    }

    pub fn with_suppress_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.suppress_patterns.push(pattern.into());
        self
    }

    /// # Errors
    /// Any [`ReportingConfig::validate`] failure.
    pub fn build(self) -> Result<ReportingConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
