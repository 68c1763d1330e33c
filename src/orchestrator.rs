//! Operation lifecycle orchestration.
//!
//! [`Operations`] owns the full lifecycle of archive operations: it
//! validates requests, runs the engine on a background thread, forwards
//! throttled progress to the caller's observer, interprets the terminal
//! result, and guarantees the cancellation token is released on every
//! exit path: success, failure, cancellation, or engine panic.
//!
//! The state machine per operation:
//!
//! ```text
//! Starting ──► Running ──► Finalizing ──► Terminal(outcome)
//!     │
//!     └──────────────────► Terminal(Failure)   (precondition failed;
//!                                               no token, no engine call)
//! ```
//!
//! [`Operations::start`] never blocks: filesystem preconditions (source
//! readable, destination directory creatable) are checked on the
//! background thread, before a token is registered or the engine is
//! invoked. Structural problems with the request itself (empty paths)
//! fail synchronously and never enter `Starting`.
//!
//! Finalization ordering is load-bearing: the observer receives the
//! outcome *before* the token handle is released, so a token can never be
//! released while the engine might still poll it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pakrun::{ArchiveEngine, Operations, OperationRequest, LogSink};
//!
//! fn run(engine: Arc<dyn ArchiveEngine>) -> pakrun::Result<()> {
//!     let operations = Operations::new(engine);
//!     let id = operations.start(
//!         OperationRequest::extract("game.pak", "./extracted"),
//!         LogSink,
//!     )?;
//!     // ... later, from any thread:
//!     operations.cancel(id)?;
//!     let outcome = operations.wait(id)?;
//!     println!("finished: {outcome}");
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::Duration;

use crate::engine::{ArchiveEngine, EntryInfo};
use crate::error::{EngineError, Error, Result};
use crate::outcome::{FailureReason, OperationOutcome};
use crate::progress::{OperationObserver, Progress, ProgressSink};
use crate::request::OperationRequest;
use crate::throttle::{DEFAULT_THROTTLE_WINDOW, ProgressThrottle};
use crate::token::{TokenHandle, TokenRegistry};

/// Identifies one operation within an [`Operations`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(u64);

impl OperationId {
    /// Wraps a raw id value.
    pub fn from_raw(raw: u64) -> Self {
        OperationId(raw)
    }

    /// Returns the raw id value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an operation currently is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    /// Accepted; preconditions are being checked, no token exists yet.
    Starting,
    /// The engine call is in flight and the token is live.
    Running,
    /// The engine call returned; the outcome is being delivered and the
    /// token released.
    Finalizing,
    /// The operation reached its terminal state and is now inert.
    Terminal(OperationOutcome),
}

impl OperationState {
    /// Returns `true` once the operation can no longer transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }

    /// The outcome, if the operation has terminated.
    pub fn outcome(&self) -> Option<&OperationOutcome> {
        match self {
            Self::Terminal(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// State shared between the front-end and one operation thread.
struct OpShared {
    state: Mutex<OperationState>,
    state_changed: Condvar,
    token: Mutex<Option<crate::token::CancelToken>>,
}

impl OpShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(OperationState::Starting),
            state_changed: Condvar::new(),
            token: Mutex::new(None),
        }
    }

    fn set_state(&self, new: OperationState) {
        *lock_recovering(&self.state) = new;
        self.state_changed.notify_all();
    }

    fn state(&self) -> OperationState {
        lock_recovering(&self.state).clone()
    }

    fn wait_terminal(&self) -> OperationOutcome {
        let mut guard = lock_recovering(&self.state);
        loop {
            if let OperationState::Terminal(outcome) = &*guard {
                return outcome.clone();
            }
            guard = self
                .state_changed
                .wait(guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("operation mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// The engine-facing sink for one operation: rate-limits `Progress`,
/// forwards everything else untouched. Throttling is drop-only: a
/// suppressed snapshot is never replayed later, so the observer sees
/// events strictly in engine order. A snapshot whose counters show
/// completion (`processed_bytes >= total_bytes`, totals known) always
/// passes, so the final counters the observer sees are the engine's true
/// last values rather than a stale intermediate.
struct ForwardingSink<'a, O: OperationObserver> {
    observer: &'a mut O,
    throttle: ProgressThrottle,
}

impl<'a, O: OperationObserver> ForwardingSink<'a, O> {
    fn new(observer: &'a mut O, throttle: ProgressThrottle) -> Self {
        Self { observer, throttle }
    }
}

impl<O: OperationObserver> ProgressSink for ForwardingSink<'_, O> {
    fn on_started(&mut self, kind: crate::OperationKind) {
        self.observer.on_started(kind);
    }

    fn on_entry_started(&mut self, name: &str) {
        self.observer.on_entry_started(name);
    }

    fn on_progress(&mut self, progress: &Progress) {
        let complete = progress.is_total_known() && progress.processed_bytes >= progress.total_bytes;
        if complete || self.throttle.admit() {
            self.observer.on_progress(progress);
        }
    }

    fn on_entry_finished(&mut self, name: &str) {
        self.observer.on_entry_finished(name);
    }

    fn on_warning(&mut self, message: &str) {
        self.observer.on_warning(message);
    }

    fn on_finished(&mut self) {
        self.observer.on_finished();
    }
}

/// The operation front-end.
///
/// One instance drives any number of concurrent operations against a
/// single engine; each operation gets an independent token and throttle.
/// The instance itself imposes no concurrency cap; if at most one
/// operation should run at a time, that policy belongs to the caller.
pub struct Operations {
    engine: Arc<dyn ArchiveEngine>,
    registry: Arc<TokenRegistry>,
    throttle_window: Duration,
    next_id: AtomicU64,
    ops: Mutex<HashMap<u64, Arc<OpShared>>>,
}

static GLOBAL: OnceLock<Operations> = OnceLock::new();

impl Operations {
    /// Creates a front-end over the given engine with the default 1000 ms
    /// progress throttle window.
    pub fn new(engine: Arc<dyn ArchiveEngine>) -> Self {
        Self {
            engine,
            registry: Arc::new(TokenRegistry::new()),
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            next_id: AtomicU64::new(1),
            ops: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the minimum interval between forwarded `Progress` events.
    ///
    /// A zero window disables throttling.
    pub fn throttle_window(mut self, window: Duration) -> Self {
        self.throttle_window = window;
        self
    }

    /// Installs a process-wide front-end, once.
    ///
    /// This is the explicit bootstrap step for applications that want a
    /// single shared service instead of threading an `Operations` value
    /// through their call graph. The first call wins; any later call is
    /// [`Error::AlreadyInstalled`].
    pub fn install_global(engine: Arc<dyn ArchiveEngine>) -> Result<&'static Operations> {
        let mut installed = false;
        let operations = GLOBAL.get_or_init(|| {
            installed = true;
            Operations::new(engine)
        });
        if installed {
            Ok(operations)
        } else {
            Err(Error::AlreadyInstalled)
        }
    }

    /// Returns the process-wide front-end, if one has been installed.
    pub fn global() -> Option<&'static Operations> {
        GLOBAL.get()
    }

    /// The token registry backing this front-end's operations.
    pub fn token_registry(&self) -> &TokenRegistry {
        &self.registry
    }

    /// Starts an operation and returns immediately.
    ///
    /// The observer receives throttled progress events from the operation
    /// thread and, exactly once, the terminal outcome. Only structural
    /// request problems are reported here; everything that can go wrong
    /// while the operation runs is reported through the outcome.
    pub fn start<O>(&self, request: OperationRequest, observer: O) -> Result<OperationId>
    where
        O: OperationObserver + 'static,
    {
        request.validate()?;

        let id = OperationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(OpShared::new());
        self.ops_lock().insert(id.0, Arc::clone(&shared));

        log::debug!(
            "operation {id} accepted: {} '{}' -> '{}'",
            request.kind(),
            request.source().display(),
            request.destination().display(),
        );

        let engine = Arc::clone(&self.engine);
        let registry = Arc::clone(&self.registry);
        let window = self.throttle_window;
        let thread_shared = Arc::clone(&shared);

        let spawned = thread::Builder::new()
            .name(format!("pakrun-op-{id}"))
            .spawn(move || {
                run_operation(id, engine, registry, window, request, thread_shared, observer);
            });

        if let Err(e) = spawned {
            // The operation never ran; withdraw it entirely.
            self.ops_lock().remove(&id.0);
            return Err(Error::Io(e));
        }
        Ok(id)
    }

    /// Requests cancellation of a running operation.
    ///
    /// Cancellation is cooperative: this only flips the operation's token
    /// flag, and the engine decides when to observe it. Cancelling an
    /// operation that already terminated is a harmless no-op; cancelling
    /// one that has not yet reached `Running` is rejected with
    /// [`Error::NothingToCancel`], since no token exists yet.
    pub fn cancel(&self, id: OperationId) -> Result<()> {
        let shared = self.get(id)?;
        if shared.state().is_terminal() {
            log::debug!("cancel of operation {id}: already terminal, ignoring");
            return Ok(());
        }
        let token = lock_recovering(&shared.token).clone();
        match token {
            Some(token) => {
                token.cancel();
                log::debug!("cancellation requested for operation {id}");
                Ok(())
            }
            // No token: either the operation has not reached Running yet,
            // or it is past the engine call and the request can no longer
            // be observed by anyone.
            None => match shared.state() {
                OperationState::Finalizing | OperationState::Terminal(_) => Ok(()),
                _ => Err(Error::NothingToCancel(id)),
            },
        }
    }

    /// Returns the operation's current lifecycle state.
    pub fn state(&self, id: OperationId) -> Result<OperationState> {
        Ok(self.get(id)?.state())
    }

    /// Returns `true` once the operation has reached its terminal state.
    pub fn is_finished(&self, id: OperationId) -> Result<bool> {
        Ok(self.state(id)?.is_terminal())
    }

    /// Blocks until the operation terminates and returns its outcome.
    ///
    /// The observer has already received the outcome by the time this
    /// returns. Waiting on an already-terminated operation returns its
    /// outcome immediately.
    pub fn wait(&self, id: OperationId) -> Result<OperationOutcome> {
        let shared = self.get(id)?;
        Ok(shared.wait_terminal())
    }

    /// Drops the bookkeeping for terminated operations.
    ///
    /// Returns how many were removed. Running operations are untouched.
    pub fn reap(&self) -> usize {
        let mut ops = self.ops_lock();
        let before = ops.len();
        ops.retain(|_, shared| !shared.state().is_terminal());
        before - ops.len()
    }

    /// Lists the entries of an archive via the engine, synchronously.
    pub fn list_entries(&self, archive: &Path) -> Result<Vec<EntryInfo>> {
        self.engine.list(archive).map_err(|e| {
            log::warn!("listing '{}' failed: {e}", archive.display());
            Error::Engine(e)
        })
    }

    /// Checks whether an archive is well-formed, synchronously.
    pub fn validate(&self, archive: &Path) -> Result<bool> {
        self.engine.validate(archive).map_err(|e| {
            log::warn!("validating '{}' failed: {e}", archive.display());
            Error::Engine(e)
        })
    }

    fn get(&self, id: OperationId) -> Result<Arc<OpShared>> {
        self.ops_lock()
            .get(&id.0)
            .cloned()
            .ok_or(Error::UnknownOperation(id))
    }

    fn ops_lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<OpShared>>> {
        lock_recovering(&self.ops)
    }
}

impl std::fmt::Debug for Operations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operations")
            .field("throttle_window", &self.throttle_window)
            .field("live_tokens", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// The body of one operation thread.
fn run_operation<O: OperationObserver>(
    id: OperationId,
    engine: Arc<dyn ArchiveEngine>,
    registry: Arc<TokenRegistry>,
    throttle_window: Duration,
    request: OperationRequest,
    shared: Arc<OpShared>,
    mut observer: O,
) {
    if let Err(reason) = check_preconditions(&request) {
        log::warn!("operation {id} failed before the engine ran: {reason}");
        finalize(
            &shared,
            &mut observer,
            OperationOutcome::Failure(reason),
            None,
            &registry,
        );
        return;
    }

    let (handle, token) = registry.register();
    *lock_recovering(&shared.token) = Some(token.clone());
    shared.set_state(OperationState::Running);
    log::debug!("operation {id} running");

    // The engine call is the only blocking step. Panics are contained
    // here so one operation cannot take down its neighbors or the caller.
    let result = {
        let mut sink = ForwardingSink::new(&mut observer, ProgressThrottle::new(throttle_window));
        panic::catch_unwind(AssertUnwindSafe(|| engine.run(&request, &token, &mut sink)))
    };

    shared.set_state(OperationState::Finalizing);

    let outcome = match result {
        Ok(Ok(())) => OperationOutcome::Success,
        Ok(Err(EngineError::Cancelled)) => OperationOutcome::Cancelled,
        Ok(Err(e)) => {
            log::warn!("operation {id} failed in the engine: {e}");
            OperationOutcome::Failure(FailureReason::Engine {
                message: e.to_string(),
            })
        }
        Err(payload) => {
            let message = panic_message(payload);
            log::warn!("operation {id} panicked in the engine: {message}");
            OperationOutcome::Failure(FailureReason::EnginePanicked { message })
        }
    };

    finalize(&shared, &mut observer, outcome, Some(handle), &registry);
}

/// Delivers the outcome, releases the token, and parks the operation in
/// its terminal state, in that order. The observer must learn the
/// outcome before the token handle disappears, and the terminal state is
/// published last so `wait` returns only after both have happened.
fn finalize<O: OperationObserver>(
    shared: &OpShared,
    observer: &mut O,
    outcome: OperationOutcome,
    handle: Option<TokenHandle>,
    registry: &TokenRegistry,
) {
    observer.on_outcome(&outcome);
    if let Some(handle) = handle {
        if let Err(e) = registry.release(handle) {
            // A failed release here means the handle lifecycle is broken
            // somewhere else; surface it instead of hiding it.
            debug_assert!(false, "token release failed: {e}");
            log::warn!("token release failed: {e}");
        }
    }
    *lock_recovering(&shared.token) = None;
    log::debug!("operation finalized: {outcome}");
    shared.set_state(OperationState::Terminal(outcome));
}

fn check_preconditions(request: &OperationRequest) -> std::result::Result<(), FailureReason> {
    let source = request.source();
    if std::fs::metadata(source).is_err() {
        return Err(FailureReason::SourceMissing {
            path: source.to_path_buf(),
        });
    }
    let dir = request.destination_dir();
    if let Err(e) = std::fs::create_dir_all(dir) {
        return Err(FailureReason::DestinationUnavailable {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        });
    }
    Ok(())
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
