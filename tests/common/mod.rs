//! Shared test utilities for integration tests.
//!
//! The central piece is [`ScriptedEngine`], a synthetic archive engine
//! that emits a configurable event script, polls the cancellation token
//! between entries like a real engine, and counts invocations so tests
//! can assert the engine was (or was not) called.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test
//! file compiles as a separate crate and may only use a subset of these
//! helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use pakrun::{
    ArchiveEngine, CancelToken, EngineError, EntryInfo, OperationKind, OperationRequest, Progress,
    ProgressSink,
};

/// A synthetic engine processing a fixed list of entries.
///
/// Per entry it emits `EntryStarted`, optionally sleeps, emits one or
/// more `Progress` snapshots, then `EntryFinished`; the token is polled
/// before each entry. Behavior toggles:
///
/// - [`entry_delay`](Self::entry_delay): sleep per entry, to widen race
///   windows deterministically.
/// - [`progress_steps`](Self::progress_steps): emit N progress snapshots
///   per entry with a delay between them, to flood the throttle.
/// - [`warn_at`](Self::warn_at): skip that entry with a `Warning`.
/// - [`fail_at`](Self::fail_at): return an engine failure when reaching
///   that entry.
/// - [`materialize_output`](Self::materialize_output): actually write
///   entry files into the destination during extraction, so tests can
///   observe partial output.
pub struct ScriptedEngine {
    entries: Vec<(String, u64)>,
    entry_delay: Duration,
    progress_steps: u64,
    step_delay: Duration,
    warn_at: Option<usize>,
    fail_at: Option<usize>,
    materialize: bool,
    runs: AtomicUsize,
}

impl ScriptedEngine {
    /// An engine over explicit (name, size) entries.
    pub fn with_entries(entries: &[(&str, u64)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(name, size)| (name.to_string(), *size))
                .collect(),
            entry_delay: Duration::ZERO,
            progress_steps: 1,
            step_delay: Duration::ZERO,
            warn_at: None,
            fail_at: None,
            materialize: false,
            runs: AtomicUsize::new(0),
        }
    }

    /// An engine over `count` uniform entries of `size` bytes each.
    pub fn uniform(count: usize, size: u64) -> Self {
        let entries: Vec<(String, u64)> = (0..count)
            .map(|i| (format!("entry-{i:04}"), size))
            .collect();
        let borrowed: Vec<(&str, u64)> = entries
            .iter()
            .map(|(name, size)| (name.as_str(), *size))
            .collect();
        Self::with_entries(&borrowed)
    }

    pub fn entry_delay(mut self, delay: Duration) -> Self {
        self.entry_delay = delay;
        self
    }

    pub fn progress_steps(mut self, steps: u64, step_delay: Duration) -> Self {
        self.progress_steps = steps.max(1);
        self.step_delay = step_delay;
        self
    }

    pub fn warn_at(mut self, index: usize) -> Self {
        self.warn_at = Some(index);
        self
    }

    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn materialize_output(mut self) -> Self {
        self.materialize = true;
        self
    }

    /// How many times `extract`/`create` ran.
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Sum of all entry sizes.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|(_, size)| size).sum()
    }

    fn emit(
        &self,
        request: &OperationRequest,
        kind: OperationKind,
        token: &CancelToken,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), EngineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);

        let total_bytes = self.total_bytes();
        let total_entries = self.entries.len() as u64;
        let mut processed_bytes = 0u64;
        let mut processed_entries = 0u64;

        sink.on_started(kind);
        for (index, (name, size)) in self.entries.iter().enumerate() {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if self.warn_at == Some(index) {
                sink.on_warning(&format!("skipping unreadable entry '{name}'"));
                continue;
            }
            if self.fail_at == Some(index) {
                return Err(EngineError::other(format!("corrupt data in '{name}'")));
            }

            sink.on_entry_started(name);
            if !self.entry_delay.is_zero() {
                thread::sleep(self.entry_delay);
            }
            if self.materialize && kind == OperationKind::Extract {
                let path = request.destination().join(name);
                std::fs::write(&path, vec![0u8; *size as usize])?;
            }

            for step in 1..=self.progress_steps {
                if !self.step_delay.is_zero() {
                    thread::sleep(self.step_delay);
                }
                sink.on_progress(&Progress {
                    current_entry: name.clone(),
                    processed_bytes: processed_bytes + size * step / self.progress_steps,
                    total_bytes,
                    processed_entries,
                    total_entries,
                });
            }

            processed_bytes += size;
            processed_entries += 1;
            sink.on_entry_finished(name);
        }
        sink.on_finished();
        Ok(())
    }
}

impl ArchiveEngine for ScriptedEngine {
    fn extract(
        &self,
        request: &OperationRequest,
        token: &CancelToken,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), EngineError> {
        self.emit(request, OperationKind::Extract, token, sink)
    }

    fn create(
        &self,
        request: &OperationRequest,
        token: &CancelToken,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), EngineError> {
        self.emit(request, OperationKind::Create, token, sink)
    }

    fn list(&self, _archive: &Path) -> Result<Vec<EntryInfo>, EngineError> {
        Ok(self
            .entries
            .iter()
            .map(|(name, size)| EntryInfo::new(name.clone(), *size))
            .collect())
    }

    fn validate(&self, _archive: &Path) -> Result<bool, EngineError> {
        Ok(true)
    }
}

/// A scratch directory with a readable source file and a destination path
/// inside it. The `TempDir` guard must stay alive for the test's duration.
pub fn scratch() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("create scratch dir");
    let source = dir.path().join("source.pak");
    std::fs::write(&source, b"synthetic archive").expect("write source");
    let destination = dir.path().join("out");
    (dir, source, destination)
}
