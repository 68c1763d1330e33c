//! Cooperative cancellation tokens.
//!
//! A [`CancelToken`] is a shared, reference-counted handle over a single
//! monotonic flag: once cancellation is requested the flag never reverts.
//! The token is the only object shared for mutation between an operation
//! thread and the threads that may cancel it, and it supports exactly one
//! mutation ([`CancelToken::cancel`], idempotent and commutative) and one
//! read ([`CancelToken::is_cancelled`]), so a single atomic flag is
//! sufficient; no locking discipline is required around it.
//!
//! For boundaries that cannot hold a typed token (callback tables, foreign
//! handle-passing interfaces), [`TokenRegistry`] maps opaque
//! [`TokenHandle`] values to live tokens. Handles are identity-only: no
//! arithmetic, never reused, and using one after release fails loudly.
//!
//! # Example
//!
//! ```rust
//! use pakrun::CancelToken;
//!
//! let token = CancelToken::new();
//! let shared = token.clone();
//!
//! assert!(!token.is_cancelled());
//! shared.cancel();
//! assert!(token.is_cancelled());
//!
//! // Cancellation is idempotent; extra requests change nothing.
//! shared.cancel();
//! assert!(token.is_cancelled());
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{Error, Result};

/// A cooperative cancellation signal for one operation.
///
/// Cloning shares the underlying flag. The flag is monotonic: it moves
/// from "not requested" to "requested" at most once and stays there, even
/// across any number of concurrent [`cancel`](Self::cancel) calls.
///
/// Cancellation is advisory: flipping the flag does not interrupt
/// anything by itself. The engine decides when to observe it, normally
/// between entries, so cancellation latency is bounded by the time to
/// finish the entry in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    requested: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh token with cancellation not requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    ///
    /// Idempotent and safe to call concurrently from any number of
    /// threads, including after the operation has already finished (at
    /// that point nobody observes the flag any more).
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    /// Returns `true` if cancellation has been requested.
    ///
    /// A non-blocking relaxed load; cheap enough to poll at high
    /// frequency.
    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }
}

/// An opaque, identity-only handle to a registered [`CancelToken`].
///
/// The value `0` is reserved: [`TokenHandle::NONE`] means "no token in
/// use" and is accepted everywhere a handle is, denoting an uncancellable
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHandle(u64);

impl TokenHandle {
    /// The null handle: no token in use.
    pub const NONE: TokenHandle = TokenHandle(0);

    /// Wraps a raw handle value.
    pub fn from_raw(raw: u64) -> Self {
        TokenHandle(raw)
    }

    /// Returns the raw handle value.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the null handle.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TokenHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An explicit table mapping handles to live tokens.
///
/// The registry exists for the boundary where a typed token cannot cross:
/// callers hold a [`TokenHandle`] and operate through the table. Handles
/// are allocated from a monotonic counter and never reused, so a released
/// handle can never silently alias a newer token; any use of it is
/// reported as [`Error::StaleTokenHandle`].
///
/// Lifecycle per handle: [`register`](Self::register) once,
/// [`cancel`](Self::cancel) zero or more times from any thread,
/// [`release`](Self::release) exactly once after the owning operation has
/// fully terminated. A second release is a lifecycle bug and fails
/// loudly, not silently.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    next: AtomicU64,
    tokens: Mutex<HashMap<u64, CancelToken>>,
}

impl TokenRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            // Handle 0 is reserved for TokenHandle::NONE.
            next: AtomicU64::new(1),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates a fresh token and returns its handle together with a
    /// typed clone for direct polling.
    pub fn register(&self) -> (TokenHandle, CancelToken) {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        let token = CancelToken::new();
        self.lock().insert(raw, token.clone());
        (TokenHandle(raw), token)
    }

    /// Returns a typed clone of the token behind `handle`.
    ///
    /// [`TokenHandle::NONE`] yields `None`: the operation is
    /// uncancellable.
    pub fn token(&self, handle: TokenHandle) -> Option<CancelToken> {
        if handle.is_none() {
            return None;
        }
        self.lock().get(&handle.0).cloned()
    }

    /// Requests cancellation through a handle.
    ///
    /// [`TokenHandle::NONE`] is accepted and does nothing. A handle that
    /// was never allocated or has been released is an error.
    pub fn cancel(&self, handle: TokenHandle) -> Result<()> {
        if handle.is_none() {
            return Ok(());
        }
        match self.lock().get(&handle.0) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(Error::StaleTokenHandle(handle)),
        }
    }

    /// Releases a handle, invalidating it.
    ///
    /// Must be called exactly once per registered handle, after the
    /// owning operation has terminated. Releasing [`TokenHandle::NONE`]
    /// does nothing; releasing any other handle twice is
    /// [`Error::StaleTokenHandle`].
    pub fn release(&self, handle: TokenHandle) -> Result<()> {
        if handle.is_none() {
            return Ok(());
        }
        match self.lock().remove(&handle.0) {
            Some(_) => Ok(()),
            None => Err(Error::StaleTokenHandle(handle)),
        }
    }

    /// Number of live (registered, unreleased) tokens.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no tokens are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, CancelToken>> {
        self.tokens.lock().unwrap_or_else(|poisoned| {
            log::warn!("token registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
