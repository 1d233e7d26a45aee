//! Recording host and observer.

use crate::application::ports::{ErrorObserver, Host};
use crate::domain::record::{ErrorRecord, RuntimeSignal};
use crate::domain::report::RequestContext;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// A call made by the controller into the host or an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FlushOutput,
    SetFallbackErrorPage,
    EmergencyShutdown(String),
    SetDiagnosticOutput(bool),
    OnError(String),
    OnTerminate(String),
}

/// Shared, ordered call journal.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn push(&self, call: Call) {
        self.calls
            .lock()
            .expect("CallLog mutex poisoned - a test thread panicked while holding the lock")
            .push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .expect("CallLog mutex poisoned - a test thread panicked while holding the lock")
            .clone()
    }

    /// Number of emergency shutdowns requested.
    pub fn shutdowns(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::EmergencyShutdown(_)))
            .count()
    }
}

/// Host double that never terminates and journals every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    log: CallLog,
    request: Arc<Mutex<RequestContext>>,
    fatal: Arc<Mutex<Option<RuntimeSignal>>>,
    has_page: bool,
    app_root: Option<PathBuf>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Journal shared with observers created through [`RecordingObserver::new`].
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn with_request(self, request: RequestContext) -> Self {
        *self.request.lock().expect("RecordingHost mutex poisoned") = request;
        self
    }

    pub fn with_response_page(mut self) -> Self {
        self.has_page = true;
        self
    }

    pub fn with_app_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.app_root = Some(root.into());
        self
    }

    /// Pretend the platform recorded a fatal signal.
    pub fn set_last_fatal_signal(&self, signal: Option<RuntimeSignal>) {
        *self.fatal.lock().expect("RecordingHost mutex poisoned") = signal;
    }
}

impl Host for RecordingHost {
    fn request_context(&self) -> RequestContext {
        self.request
            .lock()
            .expect("RecordingHost mutex poisoned")
            .clone()
    }

    fn app_root(&self) -> Option<PathBuf> {
        self.app_root.clone()
    }

    fn flush_output(&self) {
        self.log.push(Call::FlushOutput);
    }

    fn has_response_page(&self) -> bool {
        self.has_page
    }

    fn set_fallback_error_page(&self) {
        self.log.push(Call::SetFallbackErrorPage);
    }

    fn emergency_shutdown(&self, record: &ErrorRecord) {
        self.log.push(Call::EmergencyShutdown(record.message.clone()));
    }

    fn last_fatal_signal(&self) -> Option<RuntimeSignal> {
        self.fatal.lock().expect("RecordingHost mutex poisoned").clone()
    }

    fn set_diagnostic_output(&self, enabled: bool) -> bool {
        let previous = self
            .log
            .calls()
            .iter()
            .rev()
            .find_map(|c| match c {
                Call::SetDiagnosticOutput(value) => Some(*value),
                _ => None,
            })
            .unwrap_or(true);
        self.log.push(Call::SetDiagnosticOutput(enabled));
        previous
    }
}

/// Observer that journals callbacks and can rewrite records.
#[derive(Clone)]
pub struct RecordingObserver {
    log: CallLog,
    on_error: Option<Arc<dyn Fn(&mut ErrorRecord) + Send + Sync>>,
    on_terminate: Option<Arc<dyn Fn(&mut ErrorRecord) + Send + Sync>>,
}

impl RecordingObserver {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            on_error: None,
            on_terminate: None,
        }
    }

    /// Run `f` on every record passed to `on_error`.
    pub fn mutate_on_error(mut self, f: impl Fn(&mut ErrorRecord) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Run `f` on every record passed to `on_terminate`.
    pub fn mutate_on_terminate(
        mut self,
        f: impl Fn(&mut ErrorRecord) + Send + Sync + 'static,
    ) -> Self {
        self.on_terminate = Some(Arc::new(f));
        self
    }
}

impl ErrorObserver for RecordingObserver {
    fn on_error(&self, record: &mut ErrorRecord) {
        self.log.push(Call::OnError(record.message.clone()));
        if let Some(f) = &self.on_error {
            f(record);
        }
    }

    fn on_terminate(&self, record: &mut ErrorRecord) {
        self.log.push(Call::OnTerminate(record.message.clone()));
        if let Some(f) = &self.on_terminate {
            f(record);
        }
    }
}
