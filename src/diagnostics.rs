//! Where the scan reports non-fatal conditions (fallback conversions, end of
//! data, rescans). Production code goes through `TracingSink`; tests and the
//! CLI summary use `CollectingSink` to see what was reported.

use parking_lot::Mutex;
use tracing::Level;

pub const SCAN_TARGET: &str = "scriptscan::scan";

pub trait DiagnosticSink {
    fn emit(&self, level: Level, message: &str);

    fn info(&self, message: &str) { self.emit(Level::INFO, message) }
    fn warn(&self, message: &str) { self.emit(Level::WARN, message) }
    fn error(&self, message: &str) { self.emit(Level::ERROR, message) }
}

/// Forwards to `tracing` under the `scriptscan::scan` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, level: Level, message: &str) {
        // tracing macros need the level as a constant
        if level == Level::ERROR {
            tracing::error!(target: SCAN_TARGET, "{}", message)
        } else if level == Level::WARN {
            tracing::warn!(target: SCAN_TARGET, "{}", message)
        } else if level == Level::INFO {
            tracing::info!(target: SCAN_TARGET, "{}", message)
        } else if level == Level::DEBUG {
            tracing::debug!(target: SCAN_TARGET, "{}", message)
        } else {
            tracing::trace!(target: SCAN_TARGET, "{}", message)
        }
    }
}

/// Records every event; optionally forwards to another sink as well.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<(Level, String)>>,
    forward: Option<Box<dyn DiagnosticSink>>,
}

impl CollectingSink {
    pub fn new() -> Self { Self::default() }

    pub fn forwarding_to(inner: Box<dyn DiagnosticSink>) -> Self {
        Self { events: Mutex::new(Vec::new()), forward: Some(inner) }
    }

    pub fn events(&self) -> Vec<(Level, String)> { self.events.lock().clone() }

    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.events.lock().iter().filter(|(l, _)| *l == level).map(|(_, m)| m.clone()).collect()
    }

    pub fn warnings(&self) -> Vec<String> { self.messages_at(Level::WARN) }

    pub fn count(&self, level: Level) -> usize { self.events.lock().iter().filter(|(l, _)| *l == level).count() }

    pub fn clear(&self) { self.events.lock().clear(); }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, level: Level, message: &str) {
        self.events.lock().push((level, message.to_string()));
        if let Some(inner) = &self.forward {
            inner.emit(level, message);
        }
    }
}

impl std::fmt::Debug for CollectingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectingSink").field("events", &self.events.lock().len()).finish()
    }
}
