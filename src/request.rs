//! Operation requests and entry selection.
//!
//! An [`OperationRequest`] describes one extract or create operation:
//! source, destination, kind, and an optional ordered set of glob
//! patterns selecting which entries take part. Requests are immutable
//! once built and consumed by
//! [`Operations::start`](crate::Operations::start).
//!
//! # Example
//!
//! ```rust
//! use pakrun::{OperationKind, OperationRequest};
//!
//! let request = OperationRequest::create("./assets", "./out/assets.pak")
//!     .patterns(["*.png", "sounds/**/*.ogg"])
//!     .unwrap();
//!
//! assert_eq!(request.kind(), OperationKind::Create);
//! assert!(request.pattern_filter().unwrap().matches("title.png"));
//! assert!(!request.pattern_filter().unwrap().matches("notes.txt"));
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// The kind of archive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Unpack an archive into a destination directory.
    Extract,
    /// Pack a directory into a new archive file.
    Create,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extract => write!(f, "extract"),
            Self::Create => write!(f, "create"),
        }
    }
}

/// An ordered sequence of glob patterns selecting entries by name.
///
/// An entry is selected when any pattern matches; patterns are kept in
/// the order given, and [`first_match`](Self::first_match) reports which
/// one matched first, which is useful for diagnostics.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    patterns: Vec<glob::Pattern>,
}

impl PatternFilter {
    /// Compiles a sequence of glob strings into a filter.
    ///
    /// The first invalid pattern aborts compilation with
    /// [`Error::InvalidPattern`].
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let compiled_pattern =
                glob::Pattern::new(pattern).map_err(|e| Error::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.msg.to_string(),
                })?;
            compiled.push(compiled_pattern);
        }
        Ok(Self { patterns: compiled })
    }

    /// Returns `true` if any pattern matches the entry name.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    /// Returns the first pattern that matches, if any.
    pub fn first_match(&self, name: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.matches(name))
            .map(|p| p.as_str())
    }

    /// Number of patterns in the filter.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns `true` if the filter holds no patterns.
    ///
    /// An empty filter matches nothing.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// An immutable description of one archive operation.
///
/// Built with [`extract`](Self::extract) or [`create`](Self::create) and
/// optionally narrowed with [`patterns`](Self::patterns); consumed once
/// by the orchestrator.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    source: PathBuf,
    destination: PathBuf,
    kind: OperationKind,
    filter: Option<PatternFilter>,
}

impl OperationRequest {
    /// Describes extracting `archive` into the directory `destination`.
    pub fn extract(archive: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: archive.into(),
            destination: destination.into(),
            kind: OperationKind::Extract,
            filter: None,
        }
    }

    /// Describes packing the directory `input` into the archive file
    /// `destination`.
    pub fn create(input: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: input.into(),
            destination: destination.into(),
            kind: OperationKind::Create,
            filter: None,
        }
    }

    /// Restricts the operation to entries matching any of the given glob
    /// patterns.
    ///
    /// Patterns are compiled eagerly so syntax errors surface here, not
    /// mid-operation.
    pub fn patterns<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter = Some(PatternFilter::new(patterns)?);
        Ok(self)
    }

    /// The archive path (extract) or input directory (create).
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The output directory (extract) or archive path (create).
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// The operation kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The entry filter, if one was attached.
    pub fn pattern_filter(&self) -> Option<&PatternFilter> {
        self.filter.as_ref()
    }

    /// Checks the request for structural problems detectable without
    /// touching the filesystem.
    ///
    /// Filesystem-dependent preconditions (source readable, destination
    /// creatable) are checked by the orchestrator when the operation
    /// starts.
    pub fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            return Err(Error::EmptySourcePath);
        }
        if self.destination.as_os_str().is_empty() {
            return Err(Error::EmptyDestinationPath);
        }
        Ok(())
    }

    /// The directory the orchestrator must ensure exists before the
    /// engine runs.
    ///
    /// For extraction this is the destination itself; for creation it is
    /// the parent of the output archive (creating an archive file does
    /// not require the file to pre-exist, only its directory). A bare
    /// filename or a root path has no usable parent and resolves to the
    /// current directory.
    pub(crate) fn destination_dir(&self) -> &Path {
        match self.kind {
            OperationKind::Extract => &self.destination,
            // A bare filename yields Some("") from parent(); a root path
            // yields None. Both mean the current directory.
            OperationKind::Create => match self.destination.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            },
        }
    }
}
