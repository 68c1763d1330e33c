//! Error types for archive operation orchestration.
//!
//! Two error enums live here with deliberately different audiences:
//!
//! - [`Error`] is returned by the orchestration API itself: request
//!   validation, operation lookup, token-handle lifecycle misuse. These are
//!   programming or configuration problems the caller can detect
//!   synchronously.
//! - [`EngineError`] is produced by an [`ArchiveEngine`] while an operation
//!   runs. The orchestrator never lets an `EngineError` escape as a fault;
//!   it is converted into the operation's terminal
//!   [`OperationOutcome`](crate::OperationOutcome).
//!
//! # Example
//!
//! ```rust
//! use pakrun::{Error, OperationRequest};
//!
//! let request = OperationRequest::extract("", "/tmp/out");
//! match request.validate() {
//!     Err(Error::EmptySourcePath) => {}
//!     other => panic!("expected empty-source error, got {:?}", other),
//! }
//! ```
//!
//! [`ArchiveEngine`]: crate::ArchiveEngine

use std::io;

use crate::orchestrator::OperationId;
use crate::token::TokenHandle;

/// The main error type for the orchestration API.
///
/// These errors surface synchronously from calls like
/// [`Operations::start`](crate::Operations::start) or
/// [`Operations::cancel`](crate::Operations::cancel). Problems that occur
/// *inside* a running operation never appear here; they become the
/// operation's terminal outcome instead.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while setting up an operation.
    ///
    /// This is raised when the background execution context itself cannot
    /// be created (resource exhaustion). Failures *inside* an operation are
    /// reported through its outcome, not through this variant.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The request's source path is empty.
    #[error("source path is empty")]
    EmptySourcePath,

    /// The request's destination path is empty.
    #[error("destination path is empty")]
    EmptyDestinationPath,

    /// A file-selection glob pattern failed to compile.
    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern that failed to compile.
        pattern: String,
        /// Description of the syntax problem.
        reason: String,
    },

    /// No operation with this id exists.
    #[error("unknown operation {0}")]
    UnknownOperation(OperationId),

    /// Cancellation was requested before the operation had a token.
    ///
    /// An operation that is still starting up has nothing to cancel yet;
    /// the request is rejected rather than remembered.
    #[error("nothing to cancel: operation {0} is not running")]
    NothingToCancel(OperationId),

    /// A token handle was used after release, or was never allocated.
    ///
    /// Releasing or cancelling through a stale handle is a lifecycle bug
    /// in the caller, so it fails loudly instead of silently succeeding.
    #[error("stale cancellation token handle {0}")]
    StaleTokenHandle(TokenHandle),

    /// A global operations service has already been installed.
    #[error("global operations service already installed")]
    AlreadyInstalled,

    /// An entry listing could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// An engine-level error from a synchronous passthrough call.
    ///
    /// Only [`Operations::list_entries`](crate::Operations::list_entries)
    /// and [`Operations::validate`](crate::Operations::validate) propagate
    /// engine errors directly; background operations report them through
    /// their outcome.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl Error {
    /// Returns `true` if this error indicates an invalid request.
    ///
    /// Validation errors are detected before an operation is ever started
    /// and can be fixed by correcting the request.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Error::EmptySourcePath | Error::EmptyDestinationPath | Error::InvalidPattern { .. }
        )
    }

    /// Returns `true` if this error indicates a lifecycle misuse.
    ///
    /// Lifecycle errors point at a bug in the calling code: using handles
    /// after release, cancelling operations that do not exist, or
    /// installing the global service twice.
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownOperation(_)
                | Error::NothingToCancel(_)
                | Error::StaleTokenHandle(_)
                | Error::AlreadyInstalled
        )
    }
}

/// Errors produced by an [`ArchiveEngine`](crate::ArchiveEngine) call.
///
/// Engines distinguish cooperative cancellation from genuine failure:
/// returning [`EngineError::Cancelled`] after observing a cancellation
/// request yields a `Cancelled` outcome, while every other variant yields
/// a `Failure` outcome.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// An I/O error occurred while reading the source or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive is malformed or not in the expected format.
    #[error("invalid archive format: {0}")]
    InvalidFormat(String),

    /// The operation stopped after observing a cancellation request.
    ///
    /// This is not a failure. Partial output already written is left in
    /// place; callers decide whether to clean it up.
    #[error("operation cancelled")]
    Cancelled,

    /// Any other engine-reported failure.
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Returns `true` if the engine stopped due to cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }

    /// Creates an [`EngineError::Other`] from any message.
    pub fn other(message: impl Into<String>) -> Self {
        EngineError::Other(message.into())
    }
}

/// A specialized Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;
