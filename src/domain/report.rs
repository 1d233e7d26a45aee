//! Human-readable report and notification text.

use crate::domain::cadence::Cadence;
use crate::domain::record::ErrorRecord;
use crate::domain::signature::ErrorSignature;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;

/// Placeholder used when no request is active.
pub const UNKNOWN_URL: &str = "[UNKNOWN-URL]";

/// Separator written after each entry in the log artifact.
pub const ENTRY_SEPARATOR: &str = "\n--\n\n";

/// Ambient request information supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Path (or full URL) of the request being served
    pub url: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Knobs that shape a rendered report.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Prefix for the request URL
    pub base_url: String,
    pub include_ip: bool,
    pub include_user_agent: bool,
}

/// A fault rendered for the log and for notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub signature: ErrorSignature,
    pub text: String,
}

impl ErrorReport {
    /// Render a record.
    ///
    /// Layout, one field per line: URL, date, blank line, signature, type,
    /// optional code, message, optional file/line, optional client details,
    /// blank line, stack trace.
    pub fn render(
        record: &ErrorRecord,
        signature: ErrorSignature,
        request: &RequestContext,
        timestamp: DateTime<Utc>,
        options: &ReportOptions,
    ) -> Self {
        let mut text = String::new();

        let path = request.url.as_deref().unwrap_or(UNKNOWN_URL);
        let _ = writeln!(text, "URL: {}{}", options.base_url, path);
        let _ = writeln!(text, "Date: {}", timestamp.format("%Y-%m-%dT%H:%M:%S%z"));
        text.push('\n');

        let _ = writeln!(text, "Signature: {}", signature);
        let _ = writeln!(text, "Type: {}", record.type_name);
        if let Some(code) = record.code {
            let _ = writeln!(text, "Code: {}", code);
        }
        let _ = writeln!(text, "Message: {}", record.message);

        if let Some(file) = record.file.as_deref().filter(|f| !f.is_empty()) {
            let _ = writeln!(text, "File: {}", file);
        }
        if let Some(line) = record.line.filter(|l| *l > 0) {
            let _ = writeln!(text, "Line: {}", line);
        }

        if options.include_ip {
            if let Some(ip) = &request.client_ip {
                let _ = writeln!(text, "IP: {}", ip);
            }
        }
        if options.include_user_agent {
            if let Some(agent) = &request.user_agent {
                let _ = writeln!(text, "User-Agent: {}", agent);
            }
        }

        text.push('\n');
        text.push_str(&record.stack_trace.render());

        Self { signature, text }
    }

    /// The report as appended to the log artifact.
    pub fn entry(&self) -> String {
        format!("{}{}", self.text, ENTRY_SEPARATOR)
    }
}

/// An outbound notification, ready for the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub sender: Option<String>,
}

impl Notification {
    /// Compose the notification for a report.
    pub fn compose(
        report: &ErrorReport,
        cadence: &Cadence,
        project_title: &str,
        console_url: Option<&str>,
        to: &str,
        sender: Option<&str>,
    ) -> Self {
        let subject = format!("[Error] {} (@{})", project_title, report.signature);

        let mut body = format!("An error occurred on \"{}\":\n", project_title);
        if let Some(url) = console_url {
            body.push_str(url);
            body.push('\n');
        }
        body.push('\n');
        body.push_str(&cadence.next_notice());
        body.push_str("\n\nLast occurred error:\n\n");
        body.push_str(&report.text);

        Self {
            to: to.to_string(),
            subject,
            body,
            sender: sender.map(str::to_string),
        }
    }
}
