//! Scoped registration of the process panic hook.
//!
//! A panic is Rust's "exception that reached the top of the call stack", so
//! the controller captures unhandled faults by owning the panic hook while it
//! is installed. Dropping the registration puts the previous hook back.

use crate::domain::record::{StackTrace, UncaughtFault};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type PanicHook = dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static;

/// Type name given to faults built from panics.
pub const PANIC_TYPE_NAME: &str = "panic";

/// Ownership of the process panic hook.
///
/// The installed hook forwards to the previous one as soon as the
/// registration is restored, even when the hook itself could not be swapped
/// back yet.
pub struct PanicHookRegistration {
    active: Arc<AtomicBool>,
    previous: Mutex<Option<Arc<PanicHook>>>,
}

impl std::fmt::Debug for PanicHookRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanicHookRegistration")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl PanicHookRegistration {
    /// Replace the current panic hook with one that hands every panic to
    /// `handler` as an [`UncaughtFault`].
    pub fn install<F>(handler: F) -> Self
    where
        F: Fn(UncaughtFault) + Send + Sync + 'static,
    {
        let previous: Arc<PanicHook> = Arc::from(panic::take_hook());
        let active = Arc::new(AtomicBool::new(true));

        let hook_active = Arc::clone(&active);
        let fallback = Arc::clone(&previous);
        panic::set_hook(Box::new(move |info| {
            if hook_active.load(Ordering::SeqCst) {
                handler(fault_from_panic(info));
            } else {
                fallback(info);
            }
        }));

        tracing::debug!("panic hook installed");
        Self {
            active,
            previous: Mutex::new(Some(previous)),
        }
    }

    /// Whether panics are still routed to the handler.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop routing panics to the handler and put the previous hook back.
    /// Idempotent.
    ///
    /// The hook cannot be swapped from a panicking thread. In that case the
    /// handler is still switched off at once and the installed hook forwards
    /// to the previous one; the swap itself happens on the next `restore`
    /// call made outside a panic.
    pub fn restore(&self) {
        self.active.store(false, Ordering::SeqCst);

        if std::thread::panicking() {
            tracing::debug!("panic hook deactivated during unwind");
            return;
        }

        let previous = self
            .previous
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(previous) = previous {
            panic::set_hook(Box::new(move |info| previous(info)));
            tracing::debug!("panic hook restored");
        }
    }
}

impl Drop for PanicHookRegistration {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Build a fault from panic details: payload as message, location, and a
/// captured backtrace as the stack trace.
pub fn fault_from_panic(info: &PanicHookInfo<'_>) -> UncaughtFault {
    let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    };

    let backtrace = Backtrace::force_capture();
    let trace = match backtrace.status() {
        BacktraceStatus::Captured => backtrace.to_string(),
        _ => String::new(),
    };

    let mut fault = UncaughtFault::new(PANIC_TYPE_NAME, message).with_stack(StackTrace::Text(trace));
    if let Some(location) = info.location() {
        fault = fault.at(location.file(), location.line());
    }
    fault
}

/// Serializes tests that take over the process-wide panic hook.
#[cfg(test)]
pub(crate) static HOOK_TEST_LOCK: Mutex<()> = Mutex::new(());
