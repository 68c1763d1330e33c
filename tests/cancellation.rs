//! Cancellation semantics: races, idempotency, and policy edges.

mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::{ScriptedEngine, scratch};
use pakrun::{
    ArchiveEngine, CollectingSink, Error, ObserverMessage, OperationOutcome, OperationRequest,
    Operations, ProgressEvent, observer_channel,
};
use rand::Rng;

#[test]
fn cancel_mid_operation_stops_within_bounded_entries() {
    let (_guard, source, dest) = scratch();
    let engine = Arc::new(
        ScriptedEngine::uniform(1000, 10).entry_delay(Duration::from_millis(2)),
    );
    let operations = Operations::new(Arc::clone(&engine) as Arc<dyn ArchiveEngine>);

    let (observer, events) = observer_channel();
    let id = operations
        .start(OperationRequest::extract(&source, &dest), observer)
        .unwrap();

    // Drive the observer side: request cancellation the moment the fifth
    // entry is reported started.
    let mut started = 0usize;
    let mut outcome_messages = 0usize;
    for message in events {
        match message {
            ObserverMessage::Event(ProgressEvent::EntryStarted { .. }) => {
                started += 1;
                if started == 5 {
                    operations.cancel(id).unwrap();
                }
            }
            ObserverMessage::Event(_) => {}
            ObserverMessage::Outcome(outcome) => {
                outcome_messages += 1;
                assert_eq!(outcome, OperationOutcome::Cancelled);
            }
        }
    }

    assert_eq!(outcome_messages, 1);
    assert_eq!(operations.wait(id).unwrap(), OperationOutcome::Cancelled);

    // The engine polls between entries, so a few more may start after the
    // request lands, but nowhere near all of them.
    assert!(started >= 5, "cancel was requested after the fifth entry");
    assert!(
        started < 1000,
        "cancellation was never observed: all {started} entries started"
    );
    assert!(operations.token_registry().is_empty());
}

#[test]
fn concurrent_cancels_collapse_to_one_effect() {
    let (_guard, source, dest) = scratch();
    let engine = Arc::new(
        ScriptedEngine::uniform(200, 10).entry_delay(Duration::from_millis(2)),
    );
    let operations = Arc::new(Operations::new(Arc::clone(&engine) as Arc<dyn ArchiveEngine>));

    let observer = Arc::new(Mutex::new(CollectingSink::new()));
    let id = operations
        .start(
            OperationRequest::extract(&source, &dest),
            Arc::clone(&observer),
        )
        .unwrap();

    // Give the operation a moment to reach Running.
    while !matches!(
        operations.state(id).unwrap(),
        pakrun::OperationState::Running
    ) {
        thread::sleep(Duration::from_millis(1));
        if operations.is_finished(id).unwrap() {
            break;
        }
    }

    let cancellers: Vec<_> = (0..8)
        .map(|_| {
            let operations = Arc::clone(&operations);
            thread::spawn(move || operations.cancel(id))
        })
        .collect();
    for canceller in cancellers {
        canceller.join().unwrap().unwrap();
    }

    assert_eq!(operations.wait(id).unwrap(), OperationOutcome::Cancelled);

    // Exactly one terminal notification despite eight cancel calls.
    let sink = observer.lock().unwrap();
    assert_eq!(sink.outcome(), Some(&OperationOutcome::Cancelled));
}

#[test]
fn cancelled_extraction_leaves_partial_output_in_place() {
    let (_guard, source, dest) = scratch();
    let engine = Arc::new(
        ScriptedEngine::uniform(100, 8)
            .entry_delay(Duration::from_millis(2))
            .materialize_output(),
    );
    let operations = Operations::new(engine);

    let (observer, events) = observer_channel();
    let id = operations
        .start(OperationRequest::extract(&source, &dest), observer)
        .unwrap();

    let mut written_before_cancel = 0usize;
    for message in events {
        if let ObserverMessage::Event(ProgressEvent::EntryFinished { .. }) = message {
            written_before_cancel += 1;
            if written_before_cancel == 3 {
                operations.cancel(id).unwrap();
            }
        }
    }

    assert_eq!(operations.wait(id).unwrap(), OperationOutcome::Cancelled);

    // Entries finished before the request stay on disk; nothing rolls
    // them back.
    let on_disk = std::fs::read_dir(&dest).unwrap().count();
    assert!(on_disk >= 3, "finished entries disappeared: {on_disk}");
    assert!(on_disk < 100, "cancellation had no effect: {on_disk}");
}

#[test]
fn cancel_after_completion_is_a_quiet_noop() {
    let (_guard, source, dest) = scratch();
    let operations = Operations::new(Arc::new(ScriptedEngine::with_entries(&[("a", 1)])));

    let id = operations
        .start(OperationRequest::extract(&source, &dest), pakrun::NullSink)
        .unwrap();
    assert_eq!(operations.wait(id).unwrap(), OperationOutcome::Success);

    // Safe to call any number of times after the fact.
    operations.cancel(id).unwrap();
    operations.cancel(id).unwrap();
}

#[test]
fn cancel_of_unknown_operation_is_an_error() {
    let operations = Operations::new(Arc::new(ScriptedEngine::with_entries(&[])));
    assert!(matches!(
        operations.cancel(pakrun::OperationId::from_raw(12345)),
        Err(Error::UnknownOperation(_))
    ));
}

#[test]
fn cancel_during_startup_is_rejected_or_harmless() {
    // Racing cancel against the Starting window must yield one of two
    // defined results: NothingToCancel (no token yet) or Ok. Anything
    // else (a panic, a stale-handle error, a hung operation) is a bug.
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(ScriptedEngine::with_entries(&[("a", 1)]));
    let operations = Operations::new(Arc::clone(&engine) as Arc<dyn ArchiveEngine>);
    let mut rng = rand::thread_rng();

    for round in 0..50 {
        // Missing source: the operation terminates during startup.
        let id = operations
            .start(
                OperationRequest::extract(
                    dir.path().join(format!("absent-{round}.pak")),
                    dir.path().join("out"),
                ),
                pakrun::NullSink,
            )
            .unwrap();

        if rng.gen_bool(0.5) {
            thread::sleep(Duration::from_micros(rng.gen_range(0..200)));
        }
        match operations.cancel(id) {
            Ok(()) => {}
            Err(Error::NothingToCancel(cancelled)) => assert_eq!(cancelled, id),
            Err(other) => panic!("unexpected cancel error: {other}"),
        }
        assert!(operations.wait(id).unwrap().is_failure());
    }

    assert_eq!(engine.run_count(), 0);
    assert!(operations.token_registry().is_empty());
}
