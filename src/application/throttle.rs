//! Logging and notification throttling for reported faults.
//!
//! For each non-suppressed record the throttle:
//! 1. drops it if its signature was already reported (when dedup is on),
//! 2. renders the report,
//! 3. appends the report to the log artifact; under the artifact lock it
//!    asks the cadence whether a notification is due and stamps the
//!    modification time with the notification window anchor,
//! 4. sends the notification if one is due and the artifact is not disabled.
//!
//! The window anchor is remembered in-process once anything has been reported;
//! before that it is read back from the artifact's modification time, so the
//! window survives restarts.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, LogStore, NotificationSink, StoreStatus};
use crate::application::registry::{SignatureRegistry, SignatureState};
use crate::domain::cadence::{Cadence, CadenceInput, NotifyDecision};
use crate::domain::record::ErrorRecord;
use crate::domain::report::{ErrorReport, Notification, ReportOptions, RequestContext};
use crate::domain::signature::ErrorSignature;
use crate::infrastructure::storage::ShardedStorage;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

/// Registry type used by the throttle.
pub type DedupRegistry = SignatureRegistry<Arc<ShardedStorage<ErrorSignature, SignatureState>>>;

/// What happened to a record handed to the throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Signature already reported; nothing written or sent
    Duplicate,
    Reported {
        /// An entry was appended to the log artifact
        logged: bool,
        /// A notification was accepted by the sink
        notified: bool,
    },
}

impl ReportOutcome {
    pub fn logged(&self) -> bool {
        matches!(self, ReportOutcome::Reported { logged: true, .. })
    }

    pub fn notified(&self) -> bool {
        matches!(self, ReportOutcome::Reported { notified: true, .. })
    }
}

/// Where notifications go and how they read.
#[derive(Debug, Clone, Default)]
pub struct NotifySettings {
    pub target: Option<String>,
    pub sender: Option<String>,
    pub project_title: String,
    pub console_url: Option<String>,
}

/// Serialized decide-append-notify step of the pipeline.
pub struct NotificationThrottle {
    store: Option<Arc<dyn LogStore>>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    registry: Option<DedupRegistry>,
    cadence: Cadence,
    notify: NotifySettings,
    report_options: ReportOptions,
    count_suppressed_as_reported: bool,
    /// Start of the current notification window; `None` until something is reported
    anchor: Mutex<Option<SystemTime>>,
    metrics: Metrics,
}

impl std::fmt::Debug for NotificationThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationThrottle")
            .field("cadence", &self.cadence)
            .field("has_store", &self.store.is_some())
            .field("notify_target", &self.notify.target)
            .field("dedup", &self.registry.is_some())
            .finish()
    }
}

impl NotificationThrottle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Option<Arc<dyn LogStore>>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        registry: Option<DedupRegistry>,
        cadence: Cadence,
        notify: NotifySettings,
        report_options: ReportOptions,
        count_suppressed_as_reported: bool,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            registry,
            cadence,
            notify,
            report_options,
            count_suppressed_as_reported,
            anchor: Mutex::new(None),
            metrics,
        }
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Remembered window anchor, if anything has been reported this run.
    pub fn anchor(&self) -> Option<SystemTime> {
        *self.anchor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of signatures currently remembered for dedup.
    pub fn tracked_signatures(&self) -> usize {
        self.registry.as_ref().map_or(0, |r| r.len())
    }

    /// Log the record and notify if the cadence allows it.
    ///
    /// Never fails: store errors are logged and counted, delivery errors are
    /// only counted.
    pub fn report_and_maybe_notify(
        &self,
        record: &ErrorRecord,
        request: &RequestContext,
    ) -> ReportOutcome {
        let signature = signature_of(record);

        if self.is_duplicate(signature) {
            self.metrics.record_duplicate();
            tracing::debug!(signature = %signature, "dropping already reported error");
            return ReportOutcome::Duplicate;
        }

        let now = self.clock.now();
        let report = ErrorReport::render(
            record,
            signature,
            request,
            DateTime::<Utc>::from(now),
            &self.report_options,
        );

        let mut anchor = self.anchor.lock().unwrap_or_else(PoisonError::into_inner);
        let remembered = *anchor;
        let notifying = self.notify.target.is_some();

        // The cadence is decided from the artifact status read under the
        // same lock as the write, so concurrent workers see each other's
        // appends and stamps.
        let mut planned: Option<(NotifyDecision, SystemTime)> = None;
        let (logged, enabled) = self.append(&report, signature, &mut |status: StoreStatus| {
            if !notifying {
                return None;
            }
            let plan = self.plan_window(now, remembered, Some(status));
            planned = Some(plan);
            Some(plan.1)
        });

        if notifying && enabled && planned.is_none() {
            // No store, or it failed before the status could be read.
            let status = self.store.as_ref().map(|_| self.store_status());
            planned = Some(self.plan_window(now, remembered, status));
        }

        let decision = match planned {
            Some((decision, next_anchor)) => {
                *anchor = Some(next_anchor);
                decision
            }
            None => NotifyDecision::Hold,
        };

        let notified = enabled && decision.is_notify() && self.send(&report);
        drop(anchor);

        ReportOutcome::Reported { logged, notified }
    }

    /// Cadence decision and the window anchor to keep afterwards.
    ///
    /// Without a store (`status` is `None`) "empty" means nothing was
    /// reported yet in this process.
    fn plan_window(
        &self,
        now: SystemTime,
        remembered: Option<SystemTime>,
        status: Option<StoreStatus>,
    ) -> (NotifyDecision, SystemTime) {
        let window_start = remembered.or(status.and_then(|s| s.modified));
        let store_empty = match status {
            Some(status) => status.is_empty(),
            None => remembered.is_none(),
        };

        let decision = self.cadence.decide(&CadenceInput {
            now,
            store_empty,
            anchor: window_start,
        });
        let next_anchor = match (decision, window_start) {
            (NotifyDecision::Hold, Some(start)) => start,
            _ => now,
        };
        (decision, next_anchor)
    }

    /// Account for a suppressed record.
    ///
    /// Only has an effect when suppressed records count as reported: the
    /// signature is remembered and the notification window starts now if it
    /// has not started yet.
    pub fn note_suppressed(&self, record: &ErrorRecord) {
        if !self.count_suppressed_as_reported {
            return;
        }

        if let Some(registry) = &self.registry {
            let (_, evicted) = registry.observe(signature_of(record));
            self.metrics.record_evictions(evicted);
        }

        let mut anchor = self.anchor.lock().unwrap_or_else(PoisonError::into_inner);
        if anchor.is_none() {
            *anchor = Some(self.clock.now());
        }
    }

    fn is_duplicate(&self, signature: ErrorSignature) -> bool {
        match &self.registry {
            Some(registry) => {
                let (observation, evicted) = registry.observe(signature);
                self.metrics.record_evictions(evicted);
                !observation.is_new()
            }
            None => false,
        }
    }

    fn store_status(&self) -> StoreStatus {
        match &self.store {
            Some(store) => store.status().unwrap_or_else(|error| {
                self.metrics.record_store_failure();
                tracing::warn!(error = %error, "could not stat error log");
                StoreStatus::default()
            }),
            None => StoreStatus::default(),
        }
    }

    /// Returns `(logged, enabled)`; a store failure still counts as enabled.
    fn append(
        &self,
        report: &ErrorReport,
        signature: ErrorSignature,
        plan: &mut dyn FnMut(StoreStatus) -> Option<SystemTime>,
    ) -> (bool, bool) {
        let Some(store) = &self.store else {
            return (false, true);
        };

        match store.append_with(&report.entry(), plan) {
            Ok(true) => {
                self.metrics.record_logged();
                (true, true)
            }
            Ok(false) => {
                tracing::debug!(signature = %signature, "error log is disabled");
                (false, false)
            }
            Err(error) => {
                self.metrics.record_store_failure();
                tracing::warn!(error = %error, signature = %signature, "failed to append to error log");
                (false, true)
            }
        }
    }

    fn send(&self, report: &ErrorReport) -> bool {
        let Some(target) = self.notify.target.as_deref() else {
            return false;
        };

        let notification = Notification::compose(
            report,
            &self.cadence,
            &self.notify.project_title,
            self.notify.console_url.as_deref(),
            target,
            self.notify.sender.as_deref(),
        );

        match self.sink.send(&notification) {
            Ok(()) => {
                self.metrics.record_notification();
                true
            }
            Err(_) => {
                self.metrics.record_delivery_failure();
                false
            }
        }
    }
}

fn signature_of(record: &ErrorRecord) -> ErrorSignature {
    match record.signature() {
        Some(signature) => signature,
        None => record.clone().seal_signature(),
    }
}
