mod common;

use common::{config, Harness};
use fault_reporter::infrastructure::mocks::{
    Call, MemoryLogStore, MockCaptureLayer, MockClock, RecordingHost, RecordingSink,
};
use fault_reporter::{
    CaptureController, ErrorKind, ErrorRecord, LogStore, OperatorAction, ReportOutcome,
    RuntimeSignal, Severity, SignalDisposition, UncaughtFault,
};
use std::sync::{Arc, Barrier};
use std::thread;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn runtime_error(message: &str) -> ErrorRecord {
    ErrorRecord::new(ErrorKind::RuntimeError, "Error", message)
}

#[test]
fn test_divide_by_zero_reported_once() {
    let h = Harness::new();
    let controller = h.controller(config(0));

    let outcome = controller.process(runtime_error("divide by zero"));

    assert_eq!(
        outcome.report,
        Some(ReportOutcome::Reported {
            logged: true,
            notified: true
        })
    );
    let contents = h.contents();
    assert_eq!(contents.matches("Message: divide by zero").count(), 1);
    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].subject,
        format!("[Error] Shop (@{})", outcome.signature)
    );
}

#[test]
fn test_duplicate_signature_appended_once() {
    let h = Harness::new();
    let controller = h.controller(config(0));

    let first = controller.process(runtime_error("same"));
    let second = controller.process(runtime_error("same"));

    assert_eq!(first.signature, second.signature);
    assert_eq!(second.report, Some(ReportOutcome::Duplicate));
    assert_eq!(h.contents().matches("Message: same").count(), 1);
    assert_eq!(h.sent(), 1);
    assert_eq!(controller.metrics().duplicates(), 1);
}

#[test]
fn test_every_error_cadence() {
    let h = Harness::new();
    let controller = h.controller(config(0));

    for i in 0..5 {
        controller.process(runtime_error(&format!("failure {}", i)));
    }

    assert_eq!(h.sent(), 5);
}

#[test]
fn test_until_cleared_cadence() {
    let h = Harness::new();
    let controller = h.controller(config(-1));

    controller.process(runtime_error("a"));
    for i in 0..4 {
        h.advance(86_400);
        controller.process(runtime_error(&format!("later {}", i)));
    }
    assert_eq!(h.sent(), 1);

    controller.operator_action(OperatorAction::Clear).unwrap();
    controller.process(runtime_error("after clear"));
    let sent = h.sink.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].body.contains("after you have cleared the error log"));
}

#[test]
fn test_until_cleared_notifies_once_across_concurrent_workers() {
    const WORKERS: usize = 8;
    let h = Harness::new();
    // Each controller stands for a separate worker process sharing the artifact.
    let controllers: Vec<_> = (0..WORKERS).map(|_| h.controller(config(-1))).collect();
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = controllers
        .into_iter()
        .enumerate()
        .map(|(i, controller)| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                controller.process(runtime_error(&format!("worker {} failed", i)))
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().report.unwrap().logged());
    }

    assert_eq!(h.sent(), 1);
    assert_eq!(h.contents().matches("Message: worker ").count(), WORKERS);
}

#[test]
fn test_interval_cadence_survives_restart() {
    let h = Harness::new();
    let first_process = h.controller(config(60));

    first_process.process(runtime_error("a"));
    assert_eq!(h.sent(), 1);

    h.advance(59);
    first_process.process(runtime_error("b"));
    assert_eq!(h.sent(), 1);

    h.advance(1);
    first_process.process(runtime_error("c"));
    assert_eq!(h.sent(), 2);

    // A new process only knows the window from the artifact's mtime.
    let second_process = h.controller(config(60));
    h.advance(30);
    second_process.process(runtime_error("d"));
    assert_eq!(h.sent(), 2);

    h.advance(30);
    second_process.process(runtime_error("e"));
    assert_eq!(h.sent(), 3);
}

#[test]
fn test_suppressed_record_only_reaches_observers() {
    let h = Harness::new();
    let controller = h.controller_with(config(0), vec![h.rewriting_observer()]);

    let mut record = runtime_error("quiet");
    record.suppressed = Some(true);
    let outcome = controller.process(record);

    assert!(outcome.suppressed);
    assert!(h.contents().is_empty());
    assert_eq!(h.sent(), 0);
    assert_eq!(h.log().calls(), vec![Call::OnError("quiet".to_string())]);
}

#[test]
fn test_termination_sequence() {
    let h = Harness::new();
    let controller = h.controller_with(config(0), vec![h.rewriting_observer()]);

    let disposition = controller.handle_runtime_signal(
        RuntimeSignal::new(Severity::UserError, "order total negative").at("src/cart.rs", 88),
    );

    let SignalDisposition::Processed(outcome) = disposition else {
        panic!("expected the signal to be processed");
    };
    assert!(outcome.terminated);
    assert_eq!(
        h.log().calls(),
        vec![
            Call::OnError("order total negative".to_string()),
            Call::FlushOutput,
            Call::OnTerminate("order total negative".to_string()),
            Call::SetFallbackErrorPage,
            Call::EmergencyShutdown("rewritten by observer".to_string()),
        ]
    );
    let contents = h.contents();
    assert!(contents.contains("Type: User error"));
    assert!(contents.contains("File: src/cart.rs"));
    assert!(contents.contains("Line: 88"));
}

#[test]
fn test_disabled_artifact_left_byte_for_byte() {
    let h = Harness::new();
    let original = b"disabledold entry\n--\n\n".to_vec();
    std::fs::write(h.store.path(), &original).unwrap();
    let controller = h.controller(config(0));

    let outcome = controller.process(runtime_error("new entry"));

    assert_eq!(
        outcome.report,
        Some(ReportOutcome::Reported {
            logged: false,
            notified: false
        })
    );
    assert_eq!(std::fs::read(h.store.path()).unwrap(), original);
    assert_eq!(h.sent(), 0);
}

#[test]
fn test_store_failure_logged_as_warning_and_still_notified() {
    let clock = MockClock::new(common::t0());
    let store = Arc::new(MemoryLogStore::new(clock.clone()));
    store.fail_writes(true);
    let sink = Arc::new(RecordingSink::new());
    let controller = CaptureController::builder(config(0))
        .with_store(store)
        .with_sink(sink.clone())
        .with_host(Arc::new(RecordingHost::new()))
        .with_clock(Arc::new(clock))
        .capture_panics(false)
        .build()
        .unwrap();

    let layer = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let outcome = tracing::subscriber::with_default(subscriber, || {
        controller.process(runtime_error("disk full"))
    });

    assert!(outcome.report.unwrap().notified());
    assert_eq!(sink.sent().len(), 1);
    assert_eq!(controller.metrics().store_failures(), 1);

    let warnings: Vec<_> = layer
        .get_captured()
        .into_iter()
        .filter(|e| e.level == Level::WARN)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "failed to append to error log");
    assert_eq!(
        warnings[0].fields.get("signature"),
        Some(&outcome.signature.to_string())
    );
    assert!(warnings[0].fields.contains_key("error"));
}

#[test]
fn test_handled_error_logged_without_shutdown() {
    let h = Harness::new();
    let controller = h.controller(config(0));
    let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream timed out");

    let outcome = controller
        .log_exception(UncaughtFault::from_error(&err))
        .unwrap();

    assert!(outcome.logged());
    assert!(h.contents().contains("Message: upstream timed out"));
    assert!(h.log().calls().is_empty());
}

#[test]
fn test_operator_toggle_stops_logging() {
    let h = Harness::new();
    let controller = h.controller(config(0));

    let view = controller
        .operator_action(OperatorAction::ToggleDisabled)
        .unwrap();
    assert!(view.disabled);

    controller.process(runtime_error("while disabled"));
    assert!(h.store.is_disabled().unwrap());
    assert!(!h.contents().contains("while disabled"));

    let view = controller.operator_action(OperatorAction::Clear).unwrap();
    assert!(!view.disabled);
    controller.process(runtime_error("after enabling"));
    assert!(h.contents().contains("after enabling"));
}
