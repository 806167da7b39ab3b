//! Scope registry and flush protocol
//!
//! Maps each live `ScopeId` to its buffer. The map sits behind one
//! reader/writer lock; each buffer has its own mutex so appends to different
//! scopes only contend on the read side of the map lock.
//!
//! Lock order is always map then buffer, and a flush releases the map lock
//! before touching the buffer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::buffer::{BufferDefaults, LogBuffer};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::LogRecord;
use crate::scope::{Lifetime, Scope, ScopeId};
use crate::severity::Severity;
use crate::sink::Sink;
use crate::watcher;

/// A buffer shared between the registry and in-flight appends
pub type SharedBuffer = Arc<Mutex<LogBuffer>>;

/// Result of a flush call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The record was written to the sink
    Emitted,
    /// No entry for the scope: already flushed, removed, or never created
    Absent,
}

/// Totals from [`ScopeRegistry::flush_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Records written to the sink
    pub emitted: usize,
    /// Records dropped because serialization or the sink failed
    pub failed: usize,
}

struct Entry {
    buffer: SharedBuffer,
    /// Cancelled when the entry leaves the map so its watcher exits
    retire: CancellationToken,
}

/// Thread-safe mapping from scope identity to log buffer
pub struct ScopeRegistry {
    entries: RwLock<HashMap<ScopeId, Entry>>,
    defaults: BufferDefaults,
    sink: Arc<dyn Sink>,
    active_watchers: Arc<AtomicUsize>,
    self_ref: Weak<ScopeRegistry>,
}

impl ScopeRegistry {
    /// Create a registry writing records to `sink`
    pub fn new(defaults: BufferDefaults, sink: Arc<dyn Sink>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            entries: RwLock::new(HashMap::new()),
            defaults,
            sink,
            active_watchers: Arc::new(AtomicUsize::new(0)),
            self_ref: self_ref.clone(),
        })
    }

    /// Create a registry from loaded configuration
    pub fn from_config(config: &Config) -> Result<Arc<Self>> {
        config.validate()?;
        let sink = config.sink.build()?;
        Ok(Self::new(config.buffer_defaults(), sink))
    }

    pub fn defaults(&self) -> &BufferDefaults {
        &self.defaults
    }

    /// Open a new scope with a fresh identity bound to `lifetime`
    pub fn open(self: &Arc<Self>, lifetime: Lifetime) -> Scope {
        let id = ScopeId::new();
        self.get_or_create(id, &lifetime);
        Scope::new(id, lifetime, Arc::clone(self))
    }

    /// Fetch the buffer for `id`, creating it if needed
    ///
    /// Creating a buffer also starts the watcher that flushes it when
    /// `lifetime` ends.
    pub fn get_or_create(&self, id: ScopeId, lifetime: &Lifetime) -> SharedBuffer {
        if let Some(buffer) = self.get(id) {
            return buffer;
        }
        self.create_with(id, lifetime, |_| ()).0
    }

    pub fn get(&self, id: ScopeId) -> Option<SharedBuffer> {
        self.read_entries()
            .get(&id)
            .map(|entry| Arc::clone(&entry.buffer))
    }

    pub fn contains(&self, id: ScopeId) -> bool {
        self.read_entries().contains_key(&id)
    }

    /// Drop the entry for `id` without emitting a record
    ///
    /// Idempotent. Returns whether an entry was removed.
    pub fn remove(&self, id: ScopeId) -> bool {
        match self.take_entry(id) {
            Some(entry) => {
                lock_buffer(&entry.buffer).discard();
                debug!(scope = %id, "Scope removed without flush");
                true
            }
            None => false,
        }
    }

    /// Append a message; `None` uses the default severity
    pub fn append(
        &self,
        id: ScopeId,
        lifetime: &Lifetime,
        message: &str,
        severity: Option<Severity>,
    ) {
        self.with_buffer(id, lifetime, |buffer| match severity {
            Some(severity) => buffer.append(message, severity),
            None => buffer.append_default(message),
        });
    }

    pub fn append_structured<T>(&self, id: ScopeId, lifetime: &Lifetime, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let result = self.with_buffer(id, lifetime, |buffer| buffer.append_structured(value));
        if let Err(e) = &result {
            warn!(scope = %id, error = %e, "Rejected structured log value");
        }
        result
    }

    /// Run `f` against the live buffer for `id`, creating it if needed
    ///
    /// A buffer that was sealed by a concurrent flush is never written to;
    /// the call lands in a fresh buffer instead.
    pub fn with_buffer<R>(
        &self,
        id: ScopeId,
        lifetime: &Lifetime,
        f: impl FnOnce(&mut LogBuffer) -> R,
    ) -> R {
        if let Some(buffer) = self.get(id) {
            let mut guard = lock_buffer(&buffer);
            if !guard.is_sealed() {
                return f(&mut *guard);
            }
        }
        self.create_with(id, lifetime, f).1
    }

    /// Run `f` against the live buffer for `id` without creating one
    ///
    /// Returns `None` when the scope is absent or its buffer is already
    /// sealed, so late metadata writes never start a new record.
    pub fn with_live_buffer<R>(
        &self,
        id: ScopeId,
        f: impl FnOnce(&mut LogBuffer) -> R,
    ) -> Option<R> {
        let buffer = self.get(id)?;
        let mut guard = lock_buffer(&buffer);
        if guard.is_sealed() {
            return None;
        }
        Some(f(&mut *guard))
    }

    /// Flush the scope: compose its record, write it, retire the entry
    ///
    /// At most one record is ever written per entry. The entry leaves the map
    /// under the write lock before the record is composed, so a concurrent
    /// flush of the same scope sees it absent and returns `Absent`.
    pub fn flush(&self, id: ScopeId) -> Result<FlushOutcome> {
        let Some(entry) = self.take_entry(id) else {
            return Ok(FlushOutcome::Absent);
        };

        let record = lock_buffer(&entry.buffer).seal(Utc::now());
        match record {
            Some(record) => {
                self.emit(id, &record)?;
                Ok(FlushOutcome::Emitted)
            }
            None => Ok(FlushOutcome::Absent),
        }
    }

    /// Flush every live scope
    ///
    /// Each failure is already logged by the flush itself; the summary only
    /// counts them.
    pub fn flush_all(&self) -> FlushSummary {
        let mut summary = FlushSummary::default();
        for id in self.ids() {
            match self.flush(id) {
                Ok(FlushOutcome::Emitted) => summary.emitted += 1,
                Ok(FlushOutcome::Absent) => {}
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// Identities of all live scopes
    pub fn ids(&self) -> Vec<ScopeId> {
        self.read_entries().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of watcher tasks that have not yet exited
    pub fn active_watchers(&self) -> usize {
        self.active_watchers.load(Ordering::SeqCst)
    }

    /// Insert a new entry (or reuse one created concurrently) and apply `f`
    /// before the entry's watcher can observe it
    fn create_with<R>(
        &self,
        id: ScopeId,
        lifetime: &Lifetime,
        f: impl FnOnce(&mut LogBuffer) -> R,
    ) -> (SharedBuffer, R) {
        let mut entries = self.write_entries();

        if let Some(entry) = entries.get(&id) {
            let buffer = Arc::clone(&entry.buffer);
            let result = {
                let mut guard = lock_buffer(&buffer);
                f(&mut *guard)
            };
            return (buffer, result);
        }

        let mut buffer = LogBuffer::new(&self.defaults);
        let result = f(&mut buffer);
        let buffer = Arc::new(Mutex::new(buffer));
        let retire = CancellationToken::new();

        entries.insert(
            id,
            Entry {
                buffer: Arc::clone(&buffer),
                retire: retire.clone(),
            },
        );
        drop(entries);

        debug!(scope = %id, "Scope buffer created");
        watcher::spawn(
            self.self_ref.clone(),
            id,
            lifetime.clone(),
            retire,
            Arc::clone(&self.active_watchers),
        );

        (buffer, result)
    }

    fn take_entry(&self, id: ScopeId) -> Option<Entry> {
        let entry = self.write_entries().remove(&id)?;
        entry.retire.cancel();
        Some(entry)
    }

    fn emit(&self, id: ScopeId, record: &LogRecord) -> Result<()> {
        let line = record.to_line().map_err(|e| {
            error!(scope = %id, error = %e, "Dropping log record, serialization failed");
            e
        })?;

        self.sink.write_line(&line).map_err(|e| {
            error!(scope = %id, error = %e, "Dropping log record, sink write failed");
            Error::Sink(e)
        })?;

        debug!(
            scope = %id,
            insert_id = %record.insert_id,
            severity = %record.severity,
            "Scope flushed"
        );
        Ok(())
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<ScopeId, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<ScopeId, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ScopeRegistry {
    fn drop(&mut self) {
        let summary = self.flush_all();
        if summary.failed > 0 {
            warn!(
                emitted = summary.emitted,
                failed = summary.failed,
                "Some scopes were lost on registry drop"
            );
        } else if summary.emitted > 0 {
            debug!(count = summary.emitted, "Flushed remaining scopes on registry drop");
        }
    }
}

fn lock_buffer(buffer: &SharedBuffer) -> MutexGuard<'_, LogBuffer> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}
