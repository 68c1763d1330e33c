//! Terminal outcomes for archive operations.
//!
//! Every operation produces exactly one [`OperationOutcome`], after which
//! the operation is inert. Cancellation is its own terminal state, never
//! folded into failure, so observers can present a neutral rather than an
//! alarming result.

use std::path::PathBuf;

/// Why an operation failed.
///
/// The reason distinguishes failures detected before the engine was ever
/// invoked (missing source, uncreatable destination) from failures
/// reported or caused by the engine itself.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FailureReason {
    /// The source path does not exist or is not readable.
    SourceMissing {
        /// The path that was checked.
        path: PathBuf,
    },

    /// The destination directory could not be created.
    DestinationUnavailable {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error, as text.
        reason: String,
    },

    /// The engine reported a failure while the operation ran.
    Engine {
        /// The engine's error message.
        message: String,
    },

    /// The engine panicked; the panic was contained at the operation
    /// boundary.
    EnginePanicked {
        /// The panic payload, as text.
        message: String,
    },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceMissing { path } => {
                write!(f, "source missing or unreadable: {}", path.display())
            }
            Self::DestinationUnavailable { path, reason } => {
                write!(f, "cannot create destination {}: {}", path.display(), reason)
            }
            Self::Engine { message } => write!(f, "engine failure: {message}"),
            Self::EnginePanicked { message } => write!(f, "engine panicked: {message}"),
        }
    }
}

/// The terminal state of one archive operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The operation ran to completion.
    Success,
    /// The operation failed; partial output is left in place.
    Failure(FailureReason),
    /// The operation stopped after a cancellation request was observed.
    ///
    /// Partial output is likewise left in place; no automatic rollback.
    Cancelled,
}

impl OperationOutcome {
    /// Returns `true` for a successful outcome.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns `true` for a failed outcome.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns `true` for a cancelled outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the failure reason, if this outcome is a failure.
    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match self {
            Self::Failure(reason) => Some(reason),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure(reason) => write!(f, "failure: {reason}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        assert!(OperationOutcome::Success.is_success());
        assert!(OperationOutcome::Cancelled.is_cancelled());

        let failure = OperationOutcome::Failure(FailureReason::Engine {
            message: "bad block".into(),
        });
        assert!(failure.is_failure());
        assert!(!failure.is_success());
        assert!(failure.failure_reason().is_some());
        assert!(OperationOutcome::Success.failure_reason().is_none());
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::SourceMissing {
            path: PathBuf::from("/missing.pak"),
        };
        assert!(reason.to_string().contains("/missing.pak"));

        let reason = FailureReason::DestinationUnavailable {
            path: PathBuf::from("/ro/out"),
            reason: "permission denied".into(),
        };
        let msg = reason.to_string();
        assert!(msg.contains("/ro/out"));
        assert!(msg.contains("permission denied"));

        let reason = FailureReason::EnginePanicked {
            message: "index out of bounds".into(),
        };
        assert!(reason.to_string().contains("panicked"));
    }
}
