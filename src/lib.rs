//! # pakrun
//!
//! Orchestration for long-running, cancellable, progress-reporting
//! archive operations.
//!
//! This crate does not read or write any archive container itself.
//! It owns everything *around* the archive engine that is easy to get
//! wrong: the cancellation-token lifecycle, the progress-callback
//! protocol, throttled forwarding of progress to an observer (such as a
//! notification updater), and the guarantee that every operation ends in
//! exactly one terminal outcome (success, failure, or cancelled) with
//! its resources released on every exit path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pakrun::{
//!     observer_channel, ArchiveEngine, ObserverMessage, Operations, OperationRequest,
//! };
//!
//! fn main() -> pakrun::Result<()> {
//!     // An engine implementing `ArchiveEngine` for a concrete format.
//!     let engine: Arc<dyn ArchiveEngine> = todo!("bring your own engine");
//!     let operations = Operations::new(engine);
//!
//!     // Observers that live on a specific thread (UI state, notification
//!     // managers) receive events through a channel.
//!     let (observer, events) = observer_channel();
//!     let id = operations.start(
//!         OperationRequest::extract("game.pak", "./extracted"),
//!         observer,
//!     )?;
//!
//!     // Drain events wherever the observer lives. The outcome message
//!     // is always last.
//!     for message in events {
//!         match message {
//!             ObserverMessage::Event(event) => println!("{event:?}"),
//!             ObserverMessage::Outcome(outcome) => println!("done: {outcome}"),
//!         }
//!     }
//!
//!     // Any thread may request cancellation; the engine observes it
//!     // between entries.
//!     operations.cancel(id)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design
//!
//! - **Cancellation is cooperative.** [`CancelToken`] is a single
//!   monotonic atomic flag. Requesting cancellation only flips the flag;
//!   the engine polls it between entries, so latency is bounded by the
//!   entry in progress. There is no forced-abort path.
//! - **Progress is throttled, never reordered.** `Progress` events pass a
//!   per-operation [`ProgressThrottle`] (default window 1000 ms); all
//!   other events are low-frequency and always forwarded. Throttling is
//!   drop-only, and a completion snapshot always passes, so the final
//!   counters the observer sees are never stale.
//! - **Exactly one terminal notification.** Observers receive the outcome
//!   once, strictly after the last progress event, even when the engine
//!   fails or panics. Never zero times, never twice.
//! - **Handles fail loudly.** Boundaries that cannot hold a typed token
//!   use [`TokenRegistry`] handles; using a handle after release is an
//!   error, not a silent no-op.
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: lifecycle transitions at
//! `debug`, failures and lifecycle misuse at `warn`. Install any logger
//! implementation to see them.

pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod progress;
pub mod request;
pub mod throttle;
pub mod token;

pub use engine::{ArchiveEngine, EntryInfo, entries_to_json};
pub use error::{EngineError, Error, Result};
pub use orchestrator::{OperationId, OperationState, Operations};
pub use outcome::{FailureReason, OperationOutcome};
pub use progress::{
    ChannelObserver, ClosureSink, CollectingSink, LogSink, NullSink, ObserverMessage,
    OperationObserver, Progress, ProgressEvent, ProgressSink, observer_channel, sink_fn,
};
pub use request::{OperationKind, OperationRequest, PatternFilter};
pub use throttle::{DEFAULT_THROTTLE_WINDOW, ProgressThrottle};
pub use token::{CancelToken, TokenHandle, TokenRegistry};
