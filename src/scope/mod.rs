//! Scope identity and the caller-facing scope handle
//!
//! A `Scope` ties together three things: the `ScopeId` under which messages
//! are buffered, the `Lifetime` whose end triggers the automatic flush, and
//! the registry holding the buffer. Dropping the handle ends the scope.

mod lifetime;

pub use lifetime::{EndReason, Lifetime};

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::registry::{FlushOutcome, ScopeRegistry};
use crate::severity::Severity;

/// Unique identifier for one logical operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(Uuid);

impl ScopeId {
    /// Issue a fresh identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ScopeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Handle for logging into one open scope
///
/// Obtained from [`ScopeRegistry::open`]. Every message appended through the
/// handle ends up in the single record written when the scope ends, which
/// happens on the first of: an explicit [`Scope::flush`], the lifetime being
/// cancelled or expiring, or the handle being dropped.
pub struct Scope {
    id: ScopeId,
    lifetime: Lifetime,
    registry: Arc<ScopeRegistry>,
}

impl Scope {
    pub(crate) fn new(id: ScopeId, lifetime: Lifetime, registry: Arc<ScopeRegistry>) -> Self {
        Self {
            id,
            lifetime,
            registry,
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    /// Append a message at the given severity
    pub fn log(&self, severity: Severity, message: impl AsRef<str>) {
        self.registry
            .append(self.id, &self.lifetime, message.as_ref(), Some(severity));
    }

    /// Append a message at the registry's default severity
    pub fn append(&self, message: impl AsRef<str>) {
        self.registry
            .append(self.id, &self.lifetime, message.as_ref(), None);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Severity::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Severity::Info, message);
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(Severity::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Severity::Error, message);
    }

    pub fn critical(&self, message: impl AsRef<str>) {
        self.log(Severity::Critical, message);
    }

    /// Append a structured value to the record payload
    pub fn append_structured<T>(&self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.registry
            .append_structured(self.id, &self.lifetime, value)
    }

    /// Set the record's log name
    ///
    /// Ignored once the scope has been flushed.
    pub fn set_category(&self, name: impl Into<String>) {
        let name = name.into();
        if self
            .registry
            .with_live_buffer(self.id, |buffer| buffer.set_category(name))
            .is_none()
        {
            debug!(scope = %self.id, "Category set after flush ignored");
        }
    }

    /// Set a record label; ignored once the scope has been flushed
    pub fn set_label(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        if self
            .registry
            .with_live_buffer(self.id, |buffer| buffer.set_label(key, value))
            .is_none()
        {
            debug!(scope = %self.id, "Label set after flush ignored");
        }
    }

    /// Flush now instead of waiting for the lifetime to end
    pub fn flush(&self) -> Result<FlushOutcome> {
        self.registry.flush(self.id)
    }

    /// Whether the scope currently has no buffered entry
    pub fn is_flushed(&self) -> bool {
        !self.registry.contains(self.id)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        // Failures were already reported by the registry
        let _ = self.registry.flush(self.id);
    }
}
