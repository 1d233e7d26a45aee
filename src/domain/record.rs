//! Normalized representation of captured faults.
//!
//! Every fault source (runtime signals, uncaught errors and panics, the fatal
//! signal inspected at process exit) is turned into an [`ErrorRecord`] before
//! it enters the pipeline.

use crate::domain::signature::ErrorSignature;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Non-fatal runtime signal below error class
    RuntimeWarning,
    /// Runtime signal of error class
    RuntimeError,
    /// Error or panic that reached the top of the call stack
    UnhandledException,
    /// Fatal signal found at process exit
    FatalShutdownError,
    /// Raised on purpose from the operator console
    SyntheticTestError,
}

/// Severity of a runtime signal raised by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Unrecoverable runtime failure
    Fatal,
    /// Source could not be parsed/loaded
    Parse,
    Error,
    UserError,
    Warning,
    UserWarning,
    Notice,
    UserNotice,
    Strict,
    Deprecated,
    UserDeprecated,
}

impl Severity {
    /// Human-readable label, used as the record's type name.
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Fatal => "Fatal error",
            Severity::Parse => "Parse error",
            Severity::Error => "Error",
            Severity::UserError => "User error",
            Severity::Warning => "Warning",
            Severity::UserWarning => "User warning",
            Severity::Notice => "Notice",
            Severity::UserNotice => "User notice",
            Severity::Strict => "Strict standards",
            Severity::Deprecated => "Deprecated",
            Severity::UserDeprecated => "User deprecated",
        }
    }

    /// Whether this severity only shows up as the last fatal signal at exit.
    pub fn is_fatal_class(&self) -> bool {
        matches!(self, Severity::Fatal | Severity::Parse)
    }

    /// Whether a signal of this severity is an error rather than a warning.
    pub fn is_error_class(&self) -> bool {
        matches!(
            self,
            Severity::Fatal | Severity::Parse | Severity::Error | Severity::UserError
        )
    }

    /// Severities the host may re-raise as typed errors instead of reporting.
    pub fn is_convertible(&self) -> bool {
        matches!(
            self,
            Severity::Error
                | Severity::UserError
                | Severity::Warning
                | Severity::UserWarning
                | Severity::Notice
                | Severity::UserNotice
        )
    }

    /// Record kind for a signal of this severity.
    pub fn kind(&self) -> ErrorKind {
        if self.is_error_class() {
            ErrorKind::RuntimeError
        } else {
            ErrorKind::RuntimeWarning
        }
    }
}

/// One frame of a caller-supplied stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub index: usize,
    pub file: String,
    /// Frames without a line (e.g. internal trampolines) are not rendered.
    pub line: Option<u32>,
}

impl StackFrame {
    pub fn new(index: usize, file: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            index,
            file: file.into(),
            line,
        }
    }
}

/// Stack trace attached to a record.
///
/// Hosts that walk the stack themselves hand over frames; errors and panics
/// carry an already rendered trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackTrace {
    Frames(Vec<StackFrame>),
    Text(String),
}

impl StackTrace {
    /// Render as text, one `#index file (line)` per frame.
    pub fn render(&self) -> String {
        match self {
            StackTrace::Frames(frames) => {
                let mut out = String::new();
                for frame in frames {
                    if let Some(line) = frame.line {
                        let _ = writeln!(out, "#{} {} ({})", frame.index, frame.file, line);
                    }
                }
                out
            }
            StackTrace::Text(text) => text.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            StackTrace::Frames(frames) => frames.iter().all(|f| f.line.is_none()),
            StackTrace::Text(text) => text.is_empty(),
        }
    }
}

impl Default for StackTrace {
    fn default() -> Self {
        StackTrace::Text(String::new())
    }
}

/// A non-fatal fault as raised by the host runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSignal {
    pub severity: Severity,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    /// Local state at the fault site; handed to observers, never logged.
    pub context: Option<BTreeMap<String, String>>,
    /// Call stack, excluding the handler's own frame.
    pub frames: Vec<StackFrame>,
    /// The caller explicitly silenced diagnostics for this call.
    pub silenced: bool,
}

impl RuntimeSignal {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            file: None,
            line: None,
            context: None,
            frames: Vec::new(),
            silenced: false,
        }
    }

    /// Set the source location.
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.context = Some(context);
        self
    }

    /// Mark the signal as silenced by the caller.
    pub fn silenced(mut self) -> Self {
        self.silenced = true;
        self
    }
}

/// An error that nobody handled: an uncaught error value or a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncaughtFault {
    pub type_name: String,
    pub code: Option<i64>,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub stack_trace: StackTrace,
}

impl UncaughtFault {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            code: None,
            message: message.into(),
            file: None,
            line: None,
            stack_trace: StackTrace::default(),
        }
    }

    /// Build from any error value; the source chain becomes the trace.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut chain = String::new();
        let mut source = error.source();
        let mut depth = 0;
        while let Some(cause) = source {
            let _ = writeln!(chain, "#{} caused by: {}", depth, cause);
            source = cause.source();
            depth += 1;
        }

        Self {
            type_name: std::any::type_name::<E>().to_string(),
            code: None,
            message: error.to_string(),
            file: None,
            line: None,
            stack_trace: StackTrace::Text(chain),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_stack(mut self, stack_trace: StackTrace) -> Self {
        self.stack_trace = stack_trace;
        self
    }
}

/// The normalized fault flowing through the capture pipeline.
///
/// Fields stay public so that `on_error` observers can inspect and adjust a
/// record. The signature is sealed once, before observers run, and is never
/// recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub severity: Option<Severity>,
    pub code: Option<i64>,
    pub type_name: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub stack_trace: StackTrace,
    pub context: Option<BTreeMap<String, String>>,
    pub terminate: bool,
    /// `None` defers to the controller's ambient suppression flag.
    pub suppressed: Option<bool>,
    signature: Option<ErrorSignature>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: None,
            code: None,
            type_name: type_name.into(),
            message: message.into(),
            file: None,
            line: None,
            stack_trace: StackTrace::default(),
            context: None,
            terminate: false,
            suppressed: None,
            signature: None,
        }
    }

    /// Build from a runtime signal. Termination is decided by the caller.
    pub fn from_signal(signal: RuntimeSignal) -> Self {
        Self {
            kind: signal.severity.kind(),
            severity: Some(signal.severity),
            code: None,
            type_name: signal.severity.label().to_string(),
            message: signal.message,
            file: signal.file,
            line: signal.line,
            stack_trace: StackTrace::Frames(signal.frames),
            context: signal.context,
            terminate: false,
            suppressed: None,
            signature: None,
        }
    }

    pub fn from_fault(kind: ErrorKind, fault: UncaughtFault) -> Self {
        Self {
            kind,
            severity: None,
            code: fault.code,
            type_name: fault.type_name,
            message: fault.message,
            file: fault.file,
            line: fault.line,
            stack_trace: fault.stack_trace,
            context: None,
            terminate: false,
            suppressed: None,
            signature: None,
        }
    }

    /// Record raised from the operator console to test the pipeline end to end.
    pub fn synthetic_test() -> Self {
        let mut record = Self::new(
            ErrorKind::SyntheticTestError,
            Severity::UserNotice.label(),
            "A test error has been triggered.",
        );
        record.severity = Some(Severity::UserNotice);
        record
    }

    /// Compute the signature if it has not been computed yet.
    pub fn seal_signature(&mut self) -> ErrorSignature {
        if let Some(signature) = self.signature {
            return signature;
        }

        let signature = ErrorSignature::compute(
            &self.type_name,
            &self.message,
            self.file.as_deref(),
            self.line,
            &self.stack_trace.render(),
        );
        self.signature = Some(signature);
        signature
    }

    pub fn signature(&self) -> Option<ErrorSignature> {
        self.signature
    }

    /// Suppression as resolved so far; unset counts as not suppressed.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed.unwrap_or(false)
    }
}
