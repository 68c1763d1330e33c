//! The progress event protocol for archive operations.
//!
//! While an operation runs, the engine emits a fixed set of events into a
//! [`ProgressSink`]; the orchestrator forwards them (throttled) to an
//! [`OperationObserver`], which additionally receives the terminal
//! outcome. The protocol has exactly six event kinds, captured by
//! [`ProgressEvent`].
//!
//! Ordering contract for one operation, as seen by the observer:
//!
//! - `Started` is emitted exactly once and first.
//! - `EntryStarted(name)` precedes any `Progress` or `EntryFinished`
//!   referencing the same name; `EntryFinished(name)` appears at most
//!   once per name.
//! - `Finished` is emitted exactly once and last, but only if the engine
//!   actually ran to a terminal state. If the operation dies before the
//!   engine starts (say, the destination cannot be created) no events are
//!   emitted at all, only the outcome.
//! - The outcome notification is always the very last call.
//!
//! Several stock sinks are provided: [`NullSink`] (discard),
//! [`CollectingSink`] (record for inspection), [`LogSink`] (route to the
//! `log` facade), [`sink_fn`] (closure), and [`observer_channel`] for
//! observers that must run on a specific thread.
//!
//! # Example
//!
//! ```rust
//! use pakrun::{CollectingSink, OperationKind, Progress, ProgressSink};
//!
//! let mut sink = CollectingSink::new();
//! sink.on_started(OperationKind::Extract);
//! sink.on_entry_started("data.bin");
//! sink.on_progress(&Progress {
//!     current_entry: "data.bin".into(),
//!     processed_bytes: 512,
//!     total_bytes: 1024,
//!     processed_entries: 0,
//!     total_entries: 1,
//! });
//! sink.on_entry_finished("data.bin");
//! sink.on_finished();
//!
//! assert_eq!(sink.events().len(), 5);
//! ```

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::outcome::OperationOutcome;
use crate::request::OperationKind;

/// A snapshot of overall operation progress.
///
/// `total_bytes` and `total_entries` are `0` when the total is unknown.
/// That is a legitimate state, not an error: creation operations may not
/// know their totals ahead of time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    /// The entry currently being processed.
    pub current_entry: String,
    /// Bytes processed so far across the whole operation.
    pub processed_bytes: u64,
    /// Total bytes to process, or `0` if unknown.
    pub total_bytes: u64,
    /// Entries fully processed so far.
    pub processed_entries: u64,
    /// Total number of entries, or `0` if unknown.
    pub total_entries: u64,
}

impl Progress {
    /// Returns `true` if the byte total is known.
    pub fn is_total_known(&self) -> bool {
        self.total_bytes > 0
    }

    /// Completion percentage (0.0–100.0), or `None` while the total is
    /// unknown.
    pub fn percentage(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            None
        } else {
            Some((self.processed_bytes as f64 / self.total_bytes as f64) * 100.0)
        }
    }
}

/// One event in the progress protocol.
///
/// The enum form exists for sinks that buffer or forward events across
/// threads; producers normally call the individual [`ProgressSink`]
/// methods instead of constructing events directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The engine accepted the operation and began work.
    Started {
        /// The kind of operation that started.
        kind: OperationKind,
    },
    /// Processing of a named entry began.
    EntryStarted {
        /// The entry name.
        name: String,
    },
    /// Periodic progress counters.
    Progress(Progress),
    /// Processing of a named entry completed.
    EntryFinished {
        /// The entry name.
        name: String,
    },
    /// A non-fatal problem; the operation continues.
    Warning {
        /// Human-readable description.
        message: String,
    },
    /// The engine reached its terminal state.
    Finished,
}

impl ProgressEvent {
    /// Returns `true` for events subject to throttling.
    ///
    /// Only `Progress` may be dropped by rate limiting; the other kinds
    /// are low-frequency and semantically significant, so they are always
    /// forwarded.
    pub fn is_throttleable(&self) -> bool {
        matches!(self, ProgressEvent::Progress(_))
    }
}

/// Consumer side of the six-event protocol.
///
/// All methods default to no-ops so implementations only override what
/// they care about. The engine is the sole producer during an operation;
/// it must not call the sink after its run returns.
pub trait ProgressSink: Send {
    /// The operation began.
    fn on_started(&mut self, kind: OperationKind) {
        let _ = kind;
    }

    /// Processing of `name` began.
    fn on_entry_started(&mut self, name: &str) {
        let _ = name;
    }

    /// Periodic progress counters.
    fn on_progress(&mut self, progress: &Progress) {
        let _ = progress;
    }

    /// Processing of `name` completed.
    fn on_entry_finished(&mut self, name: &str) {
        let _ = name;
    }

    /// A non-fatal problem was encountered; the operation continues.
    fn on_warning(&mut self, message: &str) {
        let _ = message;
    }

    /// The engine reached its terminal state.
    fn on_finished(&mut self) {}

    /// Dispatches an already-built event to the matching method.
    fn on_event(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { kind } => self.on_started(*kind),
            ProgressEvent::EntryStarted { name } => self.on_entry_started(name),
            ProgressEvent::Progress(progress) => self.on_progress(progress),
            ProgressEvent::EntryFinished { name } => self.on_entry_finished(name),
            ProgressEvent::Warning { message } => self.on_warning(message),
            ProgressEvent::Finished => self.on_finished(),
        }
    }
}

/// An observer of one full operation: the six events plus the terminal
/// outcome.
///
/// The orchestrator guarantees [`on_outcome`](Self::on_outcome) is called
/// exactly once per operation, strictly after the last forwarded event.
/// Never zero times, never twice.
pub trait OperationObserver: ProgressSink {
    /// The operation reached its terminal state.
    fn on_outcome(&mut self, outcome: &OperationOutcome) {
        let _ = outcome;
    }
}

/// A sink that discards everything (null object pattern).
#[derive(Debug, Default, Clone)]
pub struct NullSink;

impl ProgressSink for NullSink {}
impl OperationObserver for NullSink {}

/// A sink that records every event and the outcome for later inspection.
///
/// Mostly useful in tests; share it across threads as
/// `Arc<Mutex<CollectingSink>>`, for which the sink traits are also
/// implemented.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    events: Vec<ProgressEvent>,
    outcome: Option<OperationOutcome>,
}

impl CollectingSink {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in arrival order.
    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    /// The recorded outcome, if the operation has terminated.
    pub fn outcome(&self) -> Option<&OperationOutcome> {
        self.outcome.as_ref()
    }

    /// Names from `EntryStarted` events, in order.
    pub fn started_entries(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::EntryStarted { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Names from `EntryFinished` events, in order.
    pub fn finished_entries(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::EntryFinished { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All recorded `Progress` snapshots, in order.
    pub fn progress_events(&self) -> Vec<&Progress> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for CollectingSink {
    fn on_started(&mut self, kind: OperationKind) {
        self.events.push(ProgressEvent::Started { kind });
    }

    fn on_entry_started(&mut self, name: &str) {
        self.events.push(ProgressEvent::EntryStarted {
            name: name.to_string(),
        });
    }

    fn on_progress(&mut self, progress: &Progress) {
        self.events.push(ProgressEvent::Progress(progress.clone()));
    }

    fn on_entry_finished(&mut self, name: &str) {
        self.events.push(ProgressEvent::EntryFinished {
            name: name.to_string(),
        });
    }

    fn on_warning(&mut self, message: &str) {
        self.events.push(ProgressEvent::Warning {
            message: message.to_string(),
        });
    }

    fn on_finished(&mut self) {
        self.events.push(ProgressEvent::Finished);
    }
}

impl OperationObserver for CollectingSink {
    fn on_outcome(&mut self, outcome: &OperationOutcome) {
        self.outcome = Some(outcome.clone());
    }
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("sink mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

impl<S: ProgressSink> ProgressSink for Arc<Mutex<S>> {
    fn on_started(&mut self, kind: OperationKind) {
        lock_recovering(self).on_started(kind);
    }

    fn on_entry_started(&mut self, name: &str) {
        lock_recovering(self).on_entry_started(name);
    }

    fn on_progress(&mut self, progress: &Progress) {
        lock_recovering(self).on_progress(progress);
    }

    fn on_entry_finished(&mut self, name: &str) {
        lock_recovering(self).on_entry_finished(name);
    }

    fn on_warning(&mut self, message: &str) {
        lock_recovering(self).on_warning(message);
    }

    fn on_finished(&mut self) {
        lock_recovering(self).on_finished();
    }
}

impl<O: OperationObserver> OperationObserver for Arc<Mutex<O>> {
    fn on_outcome(&mut self, outcome: &OperationOutcome) {
        lock_recovering(self).on_outcome(outcome);
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for Box<S> {
    fn on_started(&mut self, kind: OperationKind) {
        (**self).on_started(kind);
    }

    fn on_entry_started(&mut self, name: &str) {
        (**self).on_entry_started(name);
    }

    fn on_progress(&mut self, progress: &Progress) {
        (**self).on_progress(progress);
    }

    fn on_entry_finished(&mut self, name: &str) {
        (**self).on_entry_finished(name);
    }

    fn on_warning(&mut self, message: &str) {
        (**self).on_warning(message);
    }

    fn on_finished(&mut self) {
        (**self).on_finished();
    }
}

impl<O: OperationObserver + ?Sized> OperationObserver for Box<O> {
    fn on_outcome(&mut self, outcome: &OperationOutcome) {
        (**self).on_outcome(outcome);
    }
}

/// A sink that routes events to the `log` facade.
///
/// Warnings log at `warn`, everything else at `debug`; outcomes log at
/// `info` (success/cancel) or `warn` (failure). Handy as a default
/// observer for services that already ship logs somewhere.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_started(&mut self, kind: OperationKind) {
        log::debug!("operation started: {kind}");
    }

    fn on_entry_started(&mut self, name: &str) {
        log::debug!("entry started: {name}");
    }

    fn on_progress(&mut self, progress: &Progress) {
        log::debug!(
            "progress: {}/{} bytes, {}/{} entries ({})",
            progress.processed_bytes,
            progress.total_bytes,
            progress.processed_entries,
            progress.total_entries,
            progress.current_entry,
        );
    }

    fn on_entry_finished(&mut self, name: &str) {
        log::debug!("entry finished: {name}");
    }

    fn on_warning(&mut self, message: &str) {
        log::warn!("operation warning: {message}");
    }

    fn on_finished(&mut self) {
        log::debug!("operation finished");
    }
}

impl OperationObserver for LogSink {
    fn on_outcome(&mut self, outcome: &OperationOutcome) {
        match outcome {
            OperationOutcome::Failure(reason) => log::warn!("operation failed: {reason}"),
            other => log::info!("operation outcome: {other}"),
        }
    }
}

/// A sink that calls a closure for every event.
pub struct ClosureSink<F> {
    callback: F,
}

impl<F> ProgressSink for ClosureSink<F>
where
    F: FnMut(&ProgressEvent) + Send,
{
    fn on_event(&mut self, event: &ProgressEvent) {
        (self.callback)(event);
    }

    fn on_started(&mut self, kind: OperationKind) {
        (self.callback)(&ProgressEvent::Started { kind });
    }

    fn on_entry_started(&mut self, name: &str) {
        (self.callback)(&ProgressEvent::EntryStarted {
            name: name.to_string(),
        });
    }

    fn on_progress(&mut self, progress: &Progress) {
        (self.callback)(&ProgressEvent::Progress(progress.clone()));
    }

    fn on_entry_finished(&mut self, name: &str) {
        (self.callback)(&ProgressEvent::EntryFinished {
            name: name.to_string(),
        });
    }

    fn on_warning(&mut self, message: &str) {
        (self.callback)(&ProgressEvent::Warning {
            message: message.to_string(),
        });
    }

    fn on_finished(&mut self) {
        (self.callback)(&ProgressEvent::Finished);
    }
}

/// Creates a closure-based sink.
///
/// ```rust
/// use pakrun::{sink_fn, OperationKind, ProgressSink};
///
/// let mut count = 0;
/// let mut sink = sink_fn(|_event| count += 1);
/// sink.on_started(OperationKind::Extract);
/// sink.on_finished();
/// drop(sink);
/// assert_eq!(count, 2);
/// ```
pub fn sink_fn<F>(callback: F) -> ClosureSink<F>
where
    F: FnMut(&ProgressEvent) + Send,
{
    ClosureSink { callback }
}

/// A message delivered through an [`observer_channel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverMessage {
    /// A forwarded progress-family event.
    Event(ProgressEvent),
    /// The terminal outcome; always the last message for an operation.
    Outcome(OperationOutcome),
}

/// The sending half of an [`observer_channel`].
///
/// Implements [`OperationObserver`] by queueing messages; the receiving
/// half is drained wherever the real observer lives. This is the
/// marshaling seam for observers that are not thread-safe (UI state,
/// notification managers): events are produced on the operation thread
/// but consumed on the observer's own thread.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<ObserverMessage>,
}

impl ChannelObserver {
    fn send(&self, message: ObserverMessage) {
        // A dropped receiver means the observer went away; events are
        // then discarded by design.
        if self.tx.send(message).is_err() {
            log::debug!("observer channel closed, dropping message");
        }
    }
}

impl ProgressSink for ChannelObserver {
    fn on_event(&mut self, event: &ProgressEvent) {
        self.send(ObserverMessage::Event(event.clone()));
    }

    fn on_started(&mut self, kind: OperationKind) {
        self.send(ObserverMessage::Event(ProgressEvent::Started { kind }));
    }

    fn on_entry_started(&mut self, name: &str) {
        self.send(ObserverMessage::Event(ProgressEvent::EntryStarted {
            name: name.to_string(),
        }));
    }

    fn on_progress(&mut self, progress: &Progress) {
        self.send(ObserverMessage::Event(ProgressEvent::Progress(
            progress.clone(),
        )));
    }

    fn on_entry_finished(&mut self, name: &str) {
        self.send(ObserverMessage::Event(ProgressEvent::EntryFinished {
            name: name.to_string(),
        }));
    }

    fn on_warning(&mut self, message: &str) {
        self.send(ObserverMessage::Event(ProgressEvent::Warning {
            message: message.to_string(),
        }));
    }

    fn on_finished(&mut self) {
        self.send(ObserverMessage::Event(ProgressEvent::Finished));
    }
}

impl OperationObserver for ChannelObserver {
    fn on_outcome(&mut self, outcome: &OperationOutcome) {
        self.send(ObserverMessage::Outcome(outcome.clone()));
    }
}

/// Creates a channel pair for marshaling observer calls across threads.
///
/// Pass the [`ChannelObserver`] to
/// [`Operations::start`](crate::Operations::start) and drain the receiver
/// on the thread that owns the real observer. FIFO order is preserved,
/// and the [`ObserverMessage::Outcome`] message is always last.
pub fn observer_channel() -> (ChannelObserver, mpsc::Receiver<ObserverMessage>) {
    let (tx, rx) = mpsc::channel();
    (ChannelObserver { tx }, rx)
}
