//! The archive engine contract.
//!
//! The orchestration layer does not know any archive container's byte
//! layout; it drives an [`ArchiveEngine`] through this trait. Engines are
//! blocking and externally single-threaded: one call per operation, which
//! may internally parallelize but must behave as a single synchronous
//! call from the caller's point of view.
//!
//! Obligations of an engine implementation:
//!
//! - Poll [`CancelToken::is_cancelled`] between entries. On observing a
//!   request, stop emitting events for unstarted entries, leave partial
//!   output of the entry in progress as-is, and return
//!   [`EngineError::Cancelled`].
//! - Call the sink only while the run is in progress (never after the
//!   call returns), and only with the ordering promised by the
//!   [`progress`](crate::progress) protocol.
//! - Borrow the token and sink; retain neither.
//!
//! The orchestrator guarantees in return that the source exists and the
//! destination directory has been created before the engine is invoked.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::progress::ProgressSink;
use crate::request::{OperationKind, OperationRequest};
use crate::token::CancelToken;

/// Metadata for one archive entry, as produced by [`ArchiveEngine::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    /// Entry name, with `/` separators.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}

impl EntryInfo {
    /// Creates an entry descriptor.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Serializes an entry listing to JSON.
///
/// The serialized form is the exchange format for callers that cannot
/// hold typed values across their boundary.
///
/// ```rust
/// use pakrun::{entries_to_json, EntryInfo};
///
/// let json = entries_to_json(&[EntryInfo::new("a.txt", 12)]).unwrap();
/// assert_eq!(json, r#"[{"name":"a.txt","size":12}]"#);
/// ```
pub fn entries_to_json(entries: &[EntryInfo]) -> crate::Result<String> {
    Ok(serde_json::to_string(entries)?)
}

/// A blocking archive engine.
///
/// Implementations provide the four operations of the engine boundary.
/// [`run`](Self::run) dispatches a full [`OperationRequest`] to
/// [`extract`](Self::extract) or [`create`](Self::create) and is what the
/// orchestrator calls.
pub trait ArchiveEngine: Send + Sync {
    /// Unpacks `request.source()` into the directory
    /// `request.destination()`.
    fn extract(
        &self,
        request: &OperationRequest,
        token: &CancelToken,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), EngineError>;

    /// Packs the directory `request.source()` into the archive file
    /// `request.destination()`, honoring the request's pattern filter.
    fn create(
        &self,
        request: &OperationRequest,
        token: &CancelToken,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), EngineError>;

    /// Lists the entries of an archive without extracting it.
    fn list(&self, archive: &Path) -> Result<Vec<EntryInfo>, EngineError>;

    /// Checks whether `archive` is a well-formed archive this engine can
    /// read.
    fn validate(&self, archive: &Path) -> Result<bool, EngineError>;

    /// Dispatches a request to the matching operation.
    fn run(
        &self,
        request: &OperationRequest,
        token: &CancelToken,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), EngineError> {
        match request.kind() {
            OperationKind::Extract => self.extract(request, token, sink),
            OperationKind::Create => self.create(request, token, sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;

    struct KindRecorder;

    impl ArchiveEngine for KindRecorder {
        fn extract(
            &self,
            _request: &OperationRequest,
            _token: &CancelToken,
            sink: &mut dyn ProgressSink,
        ) -> Result<(), EngineError> {
            sink.on_warning("extract");
            Ok(())
        }

        fn create(
            &self,
            _request: &OperationRequest,
            _token: &CancelToken,
            sink: &mut dyn ProgressSink,
        ) -> Result<(), EngineError> {
            sink.on_warning("create");
            Ok(())
        }

        fn list(&self, _archive: &Path) -> Result<Vec<EntryInfo>, EngineError> {
            Ok(vec![EntryInfo::new("a", 1)])
        }

        fn validate(&self, _archive: &Path) -> Result<bool, EngineError> {
            Ok(true)
        }
    }

    #[test]
    fn test_run_dispatches_on_kind() {
        use crate::progress::CollectingSink;

        let engine = KindRecorder;
        let token = CancelToken::new();

        let mut sink = CollectingSink::new();
        engine
            .run(
                &OperationRequest::extract("a.pak", "out"),
                &token,
                &mut sink,
            )
            .unwrap();
        assert_eq!(
            sink.events(),
            &[crate::ProgressEvent::Warning {
                message: "extract".into()
            }]
        );

        let mut sink = CollectingSink::new();
        engine
            .run(&OperationRequest::create("in", "a.pak"), &token, &mut sink)
            .unwrap();
        assert_eq!(
            sink.events(),
            &[crate::ProgressEvent::Warning {
                message: "create".into()
            }]
        );
    }

    #[test]
    fn test_entries_to_json() {
        let entries = vec![EntryInfo::new("dir/file.bin", 1024), EntryInfo::new("b", 0)];
        let json = entries_to_json(&entries).unwrap();
        assert_eq!(
            json,
            r#"[{"name":"dir/file.bin","size":1024},{"name":"b","size":0}]"#
        );

        // Round-trips through serde.
        let parsed: Vec<EntryInfo> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn test_entries_to_json_empty() {
        assert_eq!(entries_to_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_engine_is_object_safe() {
        let engine: Box<dyn ArchiveEngine> = Box::new(KindRecorder);
        assert!(engine.validate(Path::new("x.pak")).unwrap());
        let mut sink = NullSink;
        let token = CancelToken::new();
        engine
            .run(
                &OperationRequest::extract("a.pak", "out"),
                &token,
                &mut sink,
            )
            .unwrap();
    }
}
