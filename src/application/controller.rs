//! The capture controller: single entry point for every fault source.
//!
//! ```text
//! Uninstalled --install--> Installed --terminating record--> Terminating
//!      ^                       |
//!      +------uninstall--------+
//! ```
//!
//! Only one transition to `Installed` with capture hooks may happen per
//! controller; later `install` calls are no-ops.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, ErrorObserver, Host, LogStore, NotificationSink};
use crate::application::registry::SignatureRegistry;
use crate::application::throttle::{NotificationThrottle, NotifySettings, ReportOutcome};
use crate::config::{ReportingConfig, ReportingMode};
use crate::domain::record::{ErrorKind, ErrorRecord, RuntimeSignal, Severity, StackTrace, UncaughtFault};
use crate::domain::signature::ErrorSignature;
use crate::error::{ConfigError, StoreError};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::file_store::FileLogStore;
use crate::infrastructure::host::ProcessHost;
use crate::infrastructure::panic_hook::PanicHookRegistration;
use crate::infrastructure::sink::TracingSink;
use crate::infrastructure::storage::ShardedStorage;
use regex::Regex;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Lifecycle of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Uninstalled = 0,
    Installed = 1,
    /// A terminating record is being handled; the process is about to exit
    Terminating = 2,
}

impl From<u8> for CaptureState {
    fn from(value: u8) -> Self {
        match value {
            1 => CaptureState::Installed,
            2 => CaptureState::Terminating,
            _ => CaptureState::Uninstalled,
        }
    }
}

/// Result of running a record through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub signature: ErrorSignature,
    pub suppressed: bool,
    /// `None` when suppressed, or when the throttle panicked
    pub report: Option<ReportOutcome>,
    /// Emergency shutdown was requested
    pub terminated: bool,
}

/// What happened to a runtime signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalDisposition {
    /// Silenced by the caller, or capture is not active in this mode
    Ignored,
    Processed(ProcessOutcome),
    /// The host should raise this as a typed error instead
    Converted(UncaughtFault),
}

thread_local! {
    static IN_PIPELINE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside the pipeline until dropped.
struct PipelineScope {
    outer: bool,
}

impl PipelineScope {
    fn enter() -> Self {
        Self {
            outer: IN_PIPELINE.with(|flag| flag.replace(true)),
        }
    }

    fn active() -> bool {
        IN_PIPELINE.with(Cell::get)
    }
}

impl Drop for PipelineScope {
    fn drop(&mut self) {
        IN_PIPELINE.with(|flag| flag.set(self.outer));
    }
}

/// What `install` changed, so `uninstall` can put it back.
struct Installation {
    panic_hook: Option<PanicHookRegistration>,
    previous_diagnostics: bool,
}

/// Owns the capture state and drives records through suppression, the
/// throttle and termination.
pub struct CaptureController {
    config: ReportingConfig,
    filters: Vec<Regex>,
    throttle: NotificationThrottle,
    store: Option<Arc<dyn LogStore>>,
    host: Arc<dyn Host>,
    observers: Vec<Arc<dyn ErrorObserver>>,
    capture_panics: bool,
    state: AtomicU8,
    installed_once: AtomicBool,
    suppressing: AtomicBool,
    installation: Mutex<Option<Installation>>,
    metrics: Metrics,
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("mode", &self.config.mode)
            .field("state", &self.state())
            .field("suppressing", &self.is_suppressing())
            .field("throttle", &self.throttle)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl CaptureController {
    pub fn builder(config: ReportingConfig) -> CaptureControllerBuilder {
        CaptureControllerBuilder::new(config)
    }

    pub fn config(&self) -> &ReportingConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        CaptureState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn throttle(&self) -> &NotificationThrottle {
        &self.throttle
    }

    /// Install according to the configured mode.
    ///
    /// - `Disabled`: nothing happens.
    /// - `DisplayOnly`: the runtime's own diagnostic output is switched on.
    /// - `LogOnly`: any fatal signal left from before is logged (not fatal),
    ///   the panic hook is taken over and the runtime's diagnostic output is
    ///   switched off.
    ///
    /// The returned guard uninstalls when dropped; call
    /// [`InstallGuard::keep`] to stay installed for the process lifetime.
    ///
    /// # Panics are treated as unhandled
    ///
    /// The panic hook runs before unwinding starts, so it cannot tell whether
    /// a `catch_unwind` further up (a task runtime, a request isolation
    /// layer) will recover. Every panic on every thread therefore goes to
    /// [`handle_unhandled_exception`](Self::handle_unhandled_exception) and
    /// ends in [`Host::emergency_shutdown`]; with [`ProcessHost`] that is
    /// `exit(70)`. Hosts that recover from panics themselves should build
    /// with [`CaptureControllerBuilder::capture_panics`]`(false)` and call
    /// `handle_unhandled_exception` only for the panics they give up on.
    pub fn install(self: &Arc<Self>) -> InstallGuard {
        match self.config.mode {
            ReportingMode::Disabled => {
                tracing::debug!("error capture disabled by configuration");
                InstallGuard::inert()
            }
            ReportingMode::DisplayOnly => {
                let mut slot = self.lock_installation();
                if slot.is_some() {
                    return InstallGuard::inert();
                }
                *slot = Some(Installation {
                    panic_hook: None,
                    previous_diagnostics: self.host.set_diagnostic_output(true),
                });
                self.state.store(CaptureState::Installed as u8, Ordering::SeqCst);
                tracing::info!("runtime diagnostics enabled");
                InstallGuard::armed(self)
            }
            ReportingMode::LogOnly => {
                if self.installed_once.swap(true, Ordering::SeqCst) {
                    tracing::debug!("error capture already installed");
                    return InstallGuard::inert();
                }

                if let Some(signal) = self.host.last_fatal_signal() {
                    let mut record = ErrorRecord::from_signal(signal);
                    record.kind = ErrorKind::FatalShutdownError;
                    record.terminate = false;
                    self.process(record);
                }

                let panic_hook = self.capture_panics.then(|| {
                    let weak = Arc::downgrade(self);
                    PanicHookRegistration::install(move |fault| {
                        // A panic raised while a fault is already being handled
                        // on this thread is not captured again.
                        if PipelineScope::active() {
                            return;
                        }
                        if let Some(controller) = weak.upgrade() {
                            controller.handle_unhandled_exception(fault);
                        }
                    })
                });

                let previous_diagnostics = self.host.set_diagnostic_output(false);
                *self.lock_installation() = Some(Installation {
                    panic_hook,
                    previous_diagnostics,
                });
                self.state.store(CaptureState::Installed as u8, Ordering::SeqCst);

                tracing::info!(
                    log_path = ?self.config.log_path,
                    cadence = self.throttle.cadence().as_seconds(),
                    "error capture installed"
                );
                InstallGuard::armed(self)
            }
        }
    }

    /// Undo `install`. Safe to call when not installed.
    pub fn uninstall(&self) {
        let Some(installation) = self.lock_installation().take() else {
            return;
        };

        if let Some(hook) = &installation.panic_hook {
            hook.restore();
        }
        self.host
            .set_diagnostic_output(installation.previous_diagnostics);

        let _ = self.state.compare_exchange(
            CaptureState::Installed as u8,
            CaptureState::Uninstalled as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        tracing::info!("error capture uninstalled");
    }

    /// Overwrite the ambient suppression flag (start/stop reporting signals).
    pub fn set_suppressing(&self, suppressing: bool) {
        self.suppressing.store(suppressing, Ordering::SeqCst);
    }

    pub fn is_suppressing(&self) -> bool {
        self.suppressing.load(Ordering::SeqCst)
    }

    /// The host began emergency shutdown: nothing from teardown is reported.
    pub fn on_emergency_shutdown_begin(&self) {
        self.set_suppressing(true);
    }

    /// Handle a non-fatal runtime signal.
    pub fn handle_runtime_signal(&self, signal: RuntimeSignal) -> SignalDisposition {
        if signal.silenced || self.config.mode != ReportingMode::LogOnly {
            return SignalDisposition::Ignored;
        }

        if self.config.convert_errors_to_exceptions && signal.severity.is_convertible() {
            return SignalDisposition::Converted(convert(signal));
        }

        let terminate = self.terminates(signal.severity);
        let mut record = ErrorRecord::from_signal(signal);
        record.terminate = terminate;
        SignalDisposition::Processed(self.process(record))
    }

    /// Handle an error or panic nobody caught. Always terminates.
    pub fn handle_unhandled_exception(&self, fault: UncaughtFault) -> Option<ProcessOutcome> {
        if self.config.mode != ReportingMode::LogOnly {
            return None;
        }

        let mut record = ErrorRecord::from_fault(ErrorKind::UnhandledException, fault);
        record.terminate = true;
        Some(self.process(record))
    }

    /// Inspect the platform's last fatal signal at normal process exit.
    ///
    /// No-op unless capture was installed at some point, and unless the last
    /// signal is fatal or parse class.
    pub fn handle_process_exit(&self) -> Option<ProcessOutcome> {
        if !self.installed_once.load(Ordering::SeqCst) {
            return None;
        }

        let signal = self
            .host
            .last_fatal_signal()
            .filter(|s| s.severity.is_fatal_class())?;

        let mut record = ErrorRecord::from_signal(signal);
        record.kind = ErrorKind::FatalShutdownError;
        record.terminate = true;
        Some(self.process(record))
    }

    /// Report a handled error straight to the throttle: no suppression, no
    /// observers, no termination.
    pub fn log_exception(&self, fault: UncaughtFault) -> Option<ReportOutcome> {
        if self.config.mode == ReportingMode::Disabled {
            return None;
        }

        let mut record = ErrorRecord::from_fault(ErrorKind::RuntimeError, fault);
        record.seal_signature();
        let request = self.host.request_context();
        guarded("log_exception", || {
            self.throttle.report_and_maybe_notify(&record, &request)
        })
    }

    /// Run a synthetic, non-terminating record through the pipeline.
    pub fn trigger_test_error(&self) -> ProcessOutcome {
        self.process(ErrorRecord::synthetic_test())
    }

    /// Drive a record through suppression, observers, the throttle and,
    /// if required, termination.
    pub fn process(&self, mut record: ErrorRecord) -> ProcessOutcome {
        let _scope = PipelineScope::enter();
        self.metrics.record_processed();

        if let Some(root) = self.host.app_root() {
            if let Err(error) = std::env::set_current_dir(&root) {
                tracing::debug!(path = %root.display(), error = %error, "could not reset working directory");
            }
        }

        let signature = record.seal_signature();

        if record.suppressed.is_none() {
            record.suppressed = Some(self.is_suppressing());
        }
        self.apply_filters(&mut record);

        for observer in &self.observers {
            guarded("on_error", || observer.on_error(&mut record));
        }

        let suppressed = record.is_suppressed();
        let report = if suppressed {
            self.metrics.record_suppressed();
            guarded("note_suppressed", || self.throttle.note_suppressed(&record));
            None
        } else {
            let request = self.host.request_context();
            guarded("report", || {
                self.throttle.report_and_maybe_notify(&record, &request)
            })
        };

        let terminated = record.terminate;
        if terminated {
            self.terminate(record);
        }

        ProcessOutcome {
            signature,
            suppressed,
            report,
            terminated,
        }
    }

    /// Current contents of the log artifact; empty without a store.
    pub fn log_contents(&self) -> Result<Vec<u8>, StoreError> {
        match &self.store {
            Some(store) => store.read(),
            None => Ok(Vec::new()),
        }
    }

    /// Empty the log artifact, re-enabling it.
    pub fn clear_log(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => {
                store.clear()?;
                tracing::info!("error log cleared");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn is_disabled(&self) -> Result<bool, StoreError> {
        match &self.store {
            Some(store) => store.is_disabled(),
            None => Ok(false),
        }
    }

    /// Flip the disable marker. Returns the new disabled state.
    pub fn toggle_disabled(&self) -> Result<bool, StoreError> {
        match &self.store {
            Some(store) => store.toggle_disabled(),
            None => Ok(false),
        }
    }

    fn terminates(&self, severity: Severity) -> bool {
        match severity {
            Severity::Fatal
            | Severity::Parse
            | Severity::Error
            | Severity::UserError
            | Severity::Warning
            | Severity::UserWarning => true,
            Severity::Notice | Severity::UserNotice => self.config.terminate_on_notice,
            Severity::Strict => self.config.terminate_on_strict,
            Severity::Deprecated | Severity::UserDeprecated => self.config.terminate_on_deprecated,
        }
    }

    fn apply_filters(&self, record: &mut ErrorRecord) {
        if self.filters.iter().any(|f| f.is_match(&record.message)) {
            record.suppressed = Some(true);
        }
    }

    /// Flush, notify observers, ensure a response page, stop reporting, and
    /// hand over to the host. The order never depends on the record.
    fn terminate(&self, mut record: ErrorRecord) {
        self.state
            .store(CaptureState::Terminating as u8, Ordering::SeqCst);

        self.host.flush_output();

        for observer in &self.observers {
            guarded("on_terminate", || observer.on_terminate(&mut record));
        }

        if !self.host.has_response_page() {
            self.host.set_fallback_error_page();
        }

        self.on_emergency_shutdown_begin();
        self.host.emergency_shutdown(&record);
    }

    fn lock_installation(&self) -> std::sync::MutexGuard<'_, Option<Installation>> {
        self.installation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn convert(signal: RuntimeSignal) -> UncaughtFault {
    let mut fault = UncaughtFault::new(signal.severity.label(), signal.message)
        .with_stack(StackTrace::Frames(signal.frames));
    fault.file = signal.file;
    fault.line = signal.line;
    fault
}

/// Run `f`, turning a panic into `None`.
fn guarded<R>(stage: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(stage, "panic while handling error");
            None
        }
    }
}

/// Keeps a controller installed; uninstalls on drop unless kept.
#[must_use = "dropping the guard uninstalls error capture immediately"]
#[derive(Debug)]
pub struct InstallGuard {
    controller: Option<Weak<CaptureController>>,
}

impl InstallGuard {
    fn armed(controller: &Arc<CaptureController>) -> Self {
        Self {
            controller: Some(Arc::downgrade(controller)),
        }
    }

    fn inert() -> Self {
        Self { controller: None }
    }

    /// Whether this guard performed the installation.
    pub fn is_armed(&self) -> bool {
        self.controller.is_some()
    }

    /// Stay installed for the rest of the process.
    pub fn keep(mut self) {
        self.controller = None;
    }
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        if let Some(controller) = self.controller.take().and_then(|w| w.upgrade()) {
            controller.uninstall();
        }
    }
}

/// Builder for [`CaptureController`].
pub struct CaptureControllerBuilder {
    config: ReportingConfig,
    store: Option<Option<Arc<dyn LogStore>>>,
    sink: Option<Arc<dyn NotificationSink>>,
    host: Option<Arc<dyn Host>>,
    clock: Option<Arc<dyn Clock>>,
    observers: Vec<Arc<dyn ErrorObserver>>,
    capture_panics: bool,
}

impl CaptureControllerBuilder {
    fn new(config: ReportingConfig) -> Self {
        Self {
            config,
            store: None,
            sink: None,
            host: None,
            clock: None,
            observers: Vec::new(),
            capture_panics: true,
        }
    }

    /// Use a custom log store instead of the file at `log_path`.
    pub fn with_store(mut self, store: Arc<dyn LogStore>) -> Self {
        self.store = Some(Some(store));
        self
    }

    /// Keep nothing on disk, whatever `log_path` says.
    pub fn without_store(mut self) -> Self {
        self.store = Some(None);
        self
    }

    /// Defaults to [`TracingSink`].
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Defaults to [`ProcessHost`].
    pub fn with_host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ErrorObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Whether `install` takes over the panic hook (default true).
    ///
    /// Turn this off when the host catches panics it can recover from, for
    /// example per request or per task. A captured panic always terminates
    /// the process, even when it would have been caught.
    pub fn capture_panics(mut self, enabled: bool) -> Self {
        self.capture_panics = enabled;
        self
    }

    /// # Errors
    /// Returns a `ConfigError` if the configuration is invalid.
    pub fn build(self) -> Result<Arc<CaptureController>, ConfigError> {
        self.config.validate()?;
        let cadence = self.config.cadence()?;
        let filters = self.config.filters()?;

        let metrics = Metrics::new();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let store = self.store.unwrap_or_else(|| {
            FileLogStore::from_config(&self.config).map(|s| Arc::new(s) as Arc<dyn LogStore>)
        });
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink::new()));
        let host = self.host.unwrap_or_else(|| Arc::new(ProcessHost::new()));

        let registry = self.config.dedup_signatures.then(|| {
            SignatureRegistry::new(
                Arc::new(ShardedStorage::new()),
                Arc::clone(&clock),
                self.config.max_tracked_signatures,
            )
        });

        let throttle = NotificationThrottle::new(
            store.clone(),
            sink,
            clock,
            registry,
            cadence,
            NotifySettings {
                target: self.config.notify_target.clone(),
                sender: self.config.notify_sender.clone(),
                project_title: self.config.project_title.clone(),
                console_url: self.config.console_url.clone(),
            },
            self.config.report_options(),
            self.config.count_suppressed_as_reported,
            metrics.clone(),
        );

        Ok(Arc::new(CaptureController {
            config: self.config,
            filters,
            throttle,
            store,
            host,
            observers: self.observers,
            capture_panics: self.capture_panics,
            state: AtomicU8::new(CaptureState::Uninstalled as u8),
            installed_once: AtomicBool::new(false),
            suppressing: AtomicBool::new(false),
            installation: Mutex::new(None),
            metrics,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::StackFrame;
    use crate::infrastructure::mocks::{
        Call, MemoryLogStore, MockClock, RecordingHost, RecordingObserver, RecordingSink,
    };
    use crate::infrastructure::panic_hook::HOOK_TEST_LOCK;
    use std::time::{Duration, SystemTime};

    struct Fixture {
        controller: Arc<CaptureController>,
        store: Arc<MemoryLogStore>,
        sink: Arc<RecordingSink>,
        host: Arc<RecordingHost>,
    }

    fn config() -> ReportingConfig {
        ReportingConfig::builder()
            .with_notify_target("ops@example.com")
            .with_cadence_seconds(0)
            .with_project_title("Shop")
            .build()
            .unwrap()
    }

    fn fixture_with(
        config: ReportingConfig,
        host: RecordingHost,
        observers: Vec<Arc<dyn ErrorObserver>>,
    ) -> Fixture {
        let clock = MockClock::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        let store = Arc::new(MemoryLogStore::new(clock.clone()));
        let sink = Arc::new(RecordingSink::new());
        let host = Arc::new(host);

        let mut builder = CaptureController::builder(config)
            .with_store(store.clone())
            .with_sink(sink.clone())
            .with_host(host.clone())
            .with_clock(Arc::new(clock))
            .capture_panics(false);
        for observer in observers {
            builder = builder.with_observer(observer);
        }

        Fixture {
            controller: builder.build().unwrap(),
            store,
            sink,
            host,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(config(), RecordingHost::new(), Vec::new())
    }

    #[test]
    fn test_divide_by_zero_logged_and_notified_once() {
        let f = fixture();
        let mut record = ErrorRecord::new(ErrorKind::RuntimeError, "Error", "divide by zero");
        record.terminate = false;

        let outcome = f.controller.process(record);

        assert!(!outcome.suppressed);
        assert_eq!(
            outcome.report,
            Some(ReportOutcome::Reported {
                logged: true,
                notified: true
            })
        );
        assert_eq!(f.store.entries(), 1);
        assert!(f.store.contents().contains("Message: divide by zero"));
        assert_eq!(f.sink.sent().len(), 1);
    }

    #[test]
    fn test_silenced_signal_has_no_effect() {
        let f = fixture();
        let disposition = f
            .controller
            .handle_runtime_signal(RuntimeSignal::new(Severity::Warning, "x").silenced());

        assert_eq!(disposition, SignalDisposition::Ignored);
        assert_eq!(f.controller.metrics().processed(), 0);
        assert!(f.host.log().calls().is_empty());
    }

    #[test]
    fn test_warning_signal_terminates() {
        let f = fixture();
        let signal = RuntimeSignal::new(Severity::Warning, "undefined index")
            .at("src/page.rs", 12)
            .with_frames(vec![StackFrame::new(1, "src/main.rs", Some(3))]);

        let SignalDisposition::Processed(outcome) = f.controller.handle_runtime_signal(signal) else {
            panic!("expected signal to be processed");
        };

        assert!(outcome.terminated);
        assert_eq!(f.controller.state(), CaptureState::Terminating);
        assert_eq!(f.host.log().shutdowns(), 1);
        assert!(f.store.contents().contains("#1 src/main.rs (3)"));
    }

    #[test]
    fn test_notice_terminates_only_when_configured() {
        let f = fixture();
        let SignalDisposition::Processed(outcome) = f
            .controller
            .handle_runtime_signal(RuntimeSignal::new(Severity::Notice, "n1"))
        else {
            panic!("expected signal to be processed");
        };
        assert!(!outcome.terminated);

        let config = ReportingConfig::builder()
            .terminate_on_notice(true)
            .terminate_on_deprecated(true)
            .build()
            .unwrap();
        let f = fixture_with(config, RecordingHost::new(), Vec::new());
        for severity in [Severity::UserNotice, Severity::Deprecated] {
            let SignalDisposition::Processed(outcome) = f
                .controller
                .handle_runtime_signal(RuntimeSignal::new(severity, "n2"))
            else {
                panic!("expected signal to be processed");
            };
            assert!(outcome.terminated);
        }

        let SignalDisposition::Processed(outcome) = f
            .controller
            .handle_runtime_signal(RuntimeSignal::new(Severity::Strict, "s"))
        else {
            panic!("expected signal to be processed");
        };
        assert!(!outcome.terminated);
    }

    #[test]
    fn test_convertible_signal_returned_to_host() {
        let config = ReportingConfig::builder()
            .convert_errors_to_exceptions(true)
            .build()
            .unwrap();
        let f = fixture_with(config, RecordingHost::new(), Vec::new());

        let disposition = f
            .controller
            .handle_runtime_signal(RuntimeSignal::new(Severity::UserWarning, "bad input").at("a.rs", 4));

        let SignalDisposition::Converted(fault) = disposition else {
            panic!("expected conversion");
        };
        assert_eq!(fault.type_name, "User warning");
        assert_eq!(fault.line, Some(4));
        assert_eq!(f.controller.metrics().processed(), 0);

        // Strict is never converted.
        assert!(matches!(
            f.controller
                .handle_runtime_signal(RuntimeSignal::new(Severity::Strict, "s")),
            SignalDisposition::Processed(_)
        ));
    }

    #[test]
    fn test_suppressed_record_reaches_observers_only() {
        let host = RecordingHost::new();
        let observer: Arc<dyn ErrorObserver> = Arc::new(RecordingObserver::new(host.log()));
        let f = fixture_with(config(), host, vec![observer]);

        f.controller.set_suppressing(true);
        let outcome = f
            .controller
            .process(ErrorRecord::new(ErrorKind::RuntimeError, "Error", "quiet"));

        assert!(outcome.suppressed);
        assert_eq!(outcome.report, None);
        assert_eq!(f.store.entries(), 0);
        assert!(f.sink.sent().is_empty());
        assert_eq!(f.host.log().calls(), vec![Call::OnError("quiet".to_string())]);
        assert_eq!(f.controller.metrics().suppressed(), 1);
    }

    #[test]
    fn test_explicit_suppression_overrides_ambient_flag() {
        let f = fixture();
        f.controller.set_suppressing(true);

        let mut record = ErrorRecord::new(ErrorKind::RuntimeError, "Error", "loud");
        record.suppressed = Some(false);

        assert!(!f.controller.process(record).suppressed);
        assert_eq!(f.store.entries(), 1);
    }

    #[test]
    fn test_observer_can_suppress() {
        let host = RecordingHost::new();
        let observer: Arc<dyn ErrorObserver> = Arc::new(
            RecordingObserver::new(host.log()).mutate_on_error(|r| r.suppressed = Some(true)),
        );
        let f = fixture_with(config(), host, vec![observer]);

        let outcome = f
            .controller
            .process(ErrorRecord::new(ErrorKind::RuntimeError, "Error", "x"));

        assert!(outcome.suppressed);
        assert_eq!(f.store.entries(), 0);
    }

    #[test]
    fn test_upload_size_error_filtered() {
        let config = ReportingConfig::builder()
            .ignore_upload_size_errors(true)
            .build()
            .unwrap();
        let f = fixture_with(config, RecordingHost::new(), Vec::new());

        let outcome = f.controller.process(ErrorRecord::new(
            ErrorKind::RuntimeWarning,
            "Warning",
            "POST Content-Length of 9000000 bytes exceeds the limit of 8388608 bytes",
        ));

        assert!(outcome.suppressed);
        assert_eq!(f.store.entries(), 0);
    }

    #[test]
    fn test_termination_order_is_fixed() {
        let host = RecordingHost::new();
        let observer: Arc<dyn ErrorObserver> = Arc::new(
            RecordingObserver::new(host.log()).mutate_on_terminate(|r| {
                r.terminate = false;
                r.message = "rewritten".to_string();
            }),
        );
        let f = fixture_with(config(), host, vec![observer]);

        let outcome = f
            .controller
            .handle_unhandled_exception(UncaughtFault::new("IoError", "disk gone"))
            .unwrap();

        assert!(outcome.terminated);
        assert_eq!(
            f.host.log().calls(),
            vec![
                Call::OnError("disk gone".to_string()),
                Call::FlushOutput,
                Call::OnTerminate("disk gone".to_string()),
                Call::SetFallbackErrorPage,
                Call::EmergencyShutdown("rewritten".to_string()),
            ]
        );
        assert!(f.controller.is_suppressing());
    }

    #[test]
    fn test_existing_response_page_kept() {
        let f = fixture_with(config(), RecordingHost::new().with_response_page(), Vec::new());

        f.controller
            .handle_unhandled_exception(UncaughtFault::new("IoError", "x"));

        assert!(!f.host.log().calls().contains(&Call::SetFallbackErrorPage));
        assert_eq!(f.host.log().shutdowns(), 1);
    }

    #[test]
    fn test_teardown_errors_suppressed_after_shutdown_begins() {
        let f = fixture();
        f.controller
            .handle_unhandled_exception(UncaughtFault::new("IoError", "first"));

        let outcome = f
            .controller
            .process(ErrorRecord::new(ErrorKind::RuntimeError, "Error", "cleanup"));

        assert!(outcome.suppressed);
        assert_eq!(f.store.entries(), 1);
    }

    #[test]
    fn test_panicking_observer_does_not_escape() {
        struct Exploding;
        impl ErrorObserver for Exploding {
            fn on_error(&self, _record: &mut ErrorRecord) {
                panic!("observer bug");
            }
        }

        let _guard = HOOK_TEST_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let f = fixture_with(config(), RecordingHost::new(), vec![Arc::new(Exploding) as Arc<dyn ErrorObserver>]);
        let outcome = f
            .controller
            .process(ErrorRecord::new(ErrorKind::RuntimeError, "Error", "x"));

        assert!(outcome.report.is_some_and(|r| r.logged()));
    }

    #[test]
    fn test_install_is_idempotent_and_processes_previous_signal() {
        let host = RecordingHost::new();
        host.set_last_fatal_signal(Some(RuntimeSignal::new(Severity::Fatal, "from before")));
        let f = fixture_with(config(), host, Vec::new());

        let guard = f.controller.install();
        assert!(guard.is_armed());
        assert_eq!(f.controller.state(), CaptureState::Installed);
        assert!(f.store.contents().contains("Message: from before"));
        assert_eq!(f.host.log().shutdowns(), 0);

        let second = f.controller.install();
        assert!(!second.is_armed());
        drop(second);
        assert_eq!(f.controller.state(), CaptureState::Installed);

        drop(guard);
        assert_eq!(f.controller.state(), CaptureState::Uninstalled);
        assert_eq!(
            f.host.log().calls(),
            vec![
                Call::SetDiagnosticOutput(false),
                Call::SetDiagnosticOutput(true),
            ]
        );

        // Never re-installed within one controller.
        assert!(!f.controller.install().is_armed());
        f.controller.uninstall();
    }

    #[test]
    fn test_disabled_mode_installs_nothing() {
        let config = ReportingConfig::builder()
            .with_mode(ReportingMode::Disabled)
            .build()
            .unwrap();
        let f = fixture_with(config, RecordingHost::new(), Vec::new());

        assert!(!f.controller.install().is_armed());
        assert_eq!(
            f.controller
                .handle_runtime_signal(RuntimeSignal::new(Severity::Error, "x")),
            SignalDisposition::Ignored
        );
        assert!(f.controller.log_exception(UncaughtFault::new("E", "x")).is_none());
        assert!(f.host.log().calls().is_empty());
    }

    #[test]
    fn test_display_mode_toggles_diagnostics() {
        let config = ReportingConfig::builder()
            .with_mode(ReportingMode::DisplayOnly)
            .build()
            .unwrap();
        let f = fixture_with(config, RecordingHost::new(), Vec::new());

        let guard = f.controller.install();
        assert!(guard.is_armed());
        assert_eq!(
            f.controller
                .handle_runtime_signal(RuntimeSignal::new(Severity::Error, "x")),
            SignalDisposition::Ignored
        );
        drop(guard);

        assert_eq!(
            f.host.log().calls(),
            vec![
                Call::SetDiagnosticOutput(true),
                Call::SetDiagnosticOutput(true),
            ]
        );
    }

    #[test]
    fn test_process_exit_requires_installation_and_fatal_signal() {
        let host = RecordingHost::new();
        host.set_last_fatal_signal(Some(RuntimeSignal::new(Severity::Parse, "syntax error")));
        let f = fixture_with(config(), host, Vec::new());

        assert!(f.controller.handle_process_exit().is_none());

        f.controller.install().keep();
        let outcome = f.controller.handle_process_exit().unwrap();
        assert!(outcome.terminated);

        f.host
            .set_last_fatal_signal(Some(RuntimeSignal::new(Severity::Warning, "not fatal")));
        assert!(f.controller.handle_process_exit().is_none());
        f.controller.uninstall();
    }

    #[test]
    fn test_log_exception_bypasses_suppression() {
        let f = fixture();
        f.controller.set_suppressing(true);

        let outcome = f
            .controller
            .log_exception(UncaughtFault::new("ParseError", "bad json").with_code(3))
            .unwrap();

        assert!(outcome.logged());
        assert!(f.store.contents().contains("Code: 3"));
        assert_eq!(f.host.log().shutdowns(), 0);
    }

    #[test]
    fn test_trigger_test_error() {
        let f = fixture();
        let outcome = f.controller.trigger_test_error();

        assert!(!outcome.terminated);
        assert!(f
            .store
            .contents()
            .contains("Message: A test error has been triggered."));
    }

    #[test]
    fn test_panic_hook_routes_panics() {
        let _guard = HOOK_TEST_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let clock = MockClock::new(SystemTime::UNIX_EPOCH);
        let store = Arc::new(MemoryLogStore::new(clock.clone()));
        let host = Arc::new(RecordingHost::new());
        let controller = CaptureController::builder(config())
            .with_store(store.clone())
            .with_sink(Arc::new(RecordingSink::new()))
            .with_host(host.clone())
            .with_clock(Arc::new(clock))
            .build()
            .unwrap();

        let install = controller.install();
        let _ = panic::catch_unwind(|| panic!("worker crashed"));
        drop(install);

        assert!(store.contents().contains("Type: panic"));
        assert!(store.contents().contains("Message: worker crashed"));
        assert_eq!(host.log().shutdowns(), 1);
    }

    #[test]
    fn test_guard_dropped_while_unwinding_stops_capture() {
        let _guard = HOOK_TEST_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let original = panic::take_hook();
        let clock = MockClock::new(SystemTime::UNIX_EPOCH);
        let host = Arc::new(RecordingHost::new());
        let controller = CaptureController::builder(config())
            .with_store(Arc::new(MemoryLogStore::new(clock.clone())))
            .with_sink(Arc::new(RecordingSink::new()))
            .with_host(host.clone())
            .with_clock(Arc::new(clock))
            .build()
            .unwrap();

        let installing = Arc::clone(&controller);
        let _ = panic::catch_unwind(AssertUnwindSafe(move || {
            let _install = installing.install();
            panic!("first");
        }));
        assert_eq!(host.log().shutdowns(), 1);

        let _ = panic::catch_unwind(|| panic!("after uninstall"));
        assert_eq!(host.log().shutdowns(), 1);

        panic::set_hook(original);
    }
}
