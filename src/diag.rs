//! In-memory diagnostics sink
//!
//! A bounded ring buffer implementing `log::Log`, so a UI can subscribe to
//! recent warnings and errors without any global console patching. Plugs
//! into `simplelog::CombinedLogger` next to a terminal or file logger.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::{Level, LevelFilter, Log, Metadata, Record};
use simplelog::{Config, SharedLogger};

/// One captured log line
#[derive(Clone, Debug)]
pub struct DiagEntry {
    pub level: Level,
    pub target: String,
    pub message: String,
}

struct Inner {
    entries: Mutex<VecDeque<DiagEntry>>,
    capacity: usize,
}

/// Cloneable handle to a shared bounded log buffer
#[derive(Clone)]
pub struct DiagBuffer {
    inner: Arc<Inner>,
    level: LevelFilter,
}

impl DiagBuffer {
    #[must_use]
    pub fn new(capacity: usize, level: LevelFilter) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity: capacity.max(1),
            }),
            level,
        }
    }

    /// Snapshot of the captured entries, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<DiagEntry> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

impl Log for DiagBuffer {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.len() >= self.inner.capacity {
            entries.pop_front();
        }
        entries.push_back(DiagEntry {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

impl SharedLogger for DiagBuffer {
    fn level(&self) -> LevelFilter {
        self.level
    }

    fn config(&self) -> Option<&Config> {
        None
    }

    fn as_log(self: Box<Self>) -> Box<dyn Log> {
        Box::new(*self)
    }
}
