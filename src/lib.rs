//! opslog - per-operation structured log aggregation
//!
//! Collects every message logged during one logical operation and writes
//! them as a single JSON record when the operation ends.
//!
//! ```no_run
//! use std::time::Duration;
//! use opslog::{Lifetime, ScopeRegistry, StdoutSink};
//!
//! # async fn handle() {
//! let registry = ScopeRegistry::new(Default::default(), std::sync::Arc::new(StdoutSink));
//! let scope = registry.open(Lifetime::with_timeout(Duration::from_secs(2)));
//! scope.info("request received");
//! scope.error("upstream failed");
//! // One record with severity ERROR is written when `scope` is flushed,
//! // dropped, or its lifetime expires, whichever comes first.
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod record;
pub mod registry;
pub mod scope;
pub mod severity;
pub mod sink;
mod watcher;

pub use buffer::{BufferDefaults, LogBuffer};
pub use config::Config;
pub use error::{Error, Result};
pub use record::{LogRecord, Resource};
pub use registry::{FlushOutcome, FlushSummary, ScopeRegistry, SharedBuffer};
pub use scope::{EndReason, Lifetime, Scope, ScopeId};
pub use severity::Severity;
pub use sink::{FileSink, MemorySink, Sink, StdoutSink};
