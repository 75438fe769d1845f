//! scriptscan: rows for a query engine, produced by a Lua script.
//!
//! A wrapper script defines a class; the scan constructs one instance per
//! scan and calls its `each` method once per row. Each returned Lua value is
//! converted into a typed cell (`convert`), whole rows are assembled by
//! `materialize`, and `session` drives the lifecycle.

pub mod value;
pub mod row;
pub mod error;
pub mod runtime;
pub mod diagnostics;
pub mod convert;
pub mod opaque;
pub mod materialize;
pub mod session;
pub mod config;
pub mod cost;
pub mod frame;
pub mod settings;

pub use config::{resolve, SourceDescriptor, SourceMode};
pub use error::{ConfigError, ConvertError, RowError, ScanError, ScanResult};
pub use runtime::{LuaRuntime, RuntimeException, ScriptRuntime};
pub use session::{HostInfo, ScanSession, SessionState};
pub use value::TaggedValue;

// Test-only printing helper: expands to eprintln! during tests and debug builds.
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
