//! Scan session: one runtime, one iterator object, one pass over its rows.
//!
//! ```text
//!   Uninitialized --begin--> Active --end--> Closed
//!         |                                    ^
//!         +----------------end-----------------+
//! ```
//!
//! The runtime is held in an `Option` and taken out exactly once, by `end`
//! or by `Drop`, whichever comes first. A failed `begin` leaves the session
//! `Uninitialized` with no runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::{SourceDescriptor, SourceMode};
use crate::diagnostics::DiagnosticSink;
use crate::error::{RowError, ScanError, ScanResult};
use crate::materialize::materialize;
use crate::row::RowBuffer;
use crate::runtime::{RuntimeException, ScriptRuntime};
use crate::settings::Settings;
use crate::value::{ObjectRef, TaggedValue};

pub const HOST_VERSION: &str = "HOST_VERSION";
pub const HOST_VERSION_NUM: &str = "HOST_VERSION_NUM";
pub const PACKAGE_STRING: &str = "PACKAGE_STRING";
pub const PACKAGE_VERSION: &str = "PACKAGE_VERSION";
pub const INTERPRETER_VERSION: &str = "INTERPRETER_VERSION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        })
    }
}

/// What the host tells wrappers about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub version: String,
    pub version_num: i64,
}

impl HostInfo {
    pub fn from_settings(settings: &Settings) -> Self {
        Self { version: settings.host_version.clone(), version_num: settings.host_version_num }
    }
}

impl Default for HostInfo {
    fn default() -> Self { Self::from_settings(&Settings::default()) }
}

fn display_parameters(params: &BTreeMap<String, TaggedValue>) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(k, v)| {
            let shown = match v {
                TaggedValue::Text(b) => String::from_utf8_lossy(b).into_owned(),
                other => other.to_string(),
            };
            (k.clone(), shown)
        })
        .collect()
}

pub struct ScanSession<R: ScriptRuntime> {
    state: SessionState,
    runtime: Option<R>,
    iterator: Option<ObjectRef>,
    descriptor: SourceDescriptor,
    parameters: BTreeMap<String, TaggedValue>,
    diagnostics: Arc<dyn DiagnosticSink>,
    rows_emitted: u64,
}

impl<R: ScriptRuntime> ScanSession<R> {
    pub fn new(descriptor: SourceDescriptor, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            state: SessionState::Uninitialized,
            runtime: None,
            iterator: None,
            descriptor,
            parameters: BTreeMap::new(),
            diagnostics,
            rows_emitted: 0,
        }
    }

    /// `new` followed by `begin`.
    pub fn open<F>(descriptor: SourceDescriptor, diagnostics: Arc<dyn DiagnosticSink>, host: &HostInfo, open_runtime: F) -> ScanResult<Self>
    where
        F: FnOnce() -> Result<R, RuntimeException>,
    {
        let mut session = Self::new(descriptor, diagnostics);
        session.begin(host, open_runtime)?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState { self.state }
    pub fn descriptor(&self) -> &SourceDescriptor { &self.descriptor }
    pub fn rows_emitted(&self) -> u64 { self.rows_emitted }

    /// Constructor mapping passed to `new` (empty before `begin` succeeds).
    pub fn parameters(&self) -> &BTreeMap<String, TaggedValue> { &self.parameters }

    pub fn runtime(&self) -> Option<&R> { self.runtime.as_ref() }

    fn constructor_parameters(&self, host: &HostInfo, interpreter: String) -> BTreeMap<String, TaggedValue> {
        let mut params: BTreeMap<String, TaggedValue> = self
            .descriptor
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), TaggedValue::text(v)))
            .collect();
        // fixed keys win over user options of the same name
        params.insert(HOST_VERSION.to_string(), TaggedValue::text(&host.version));
        params.insert(HOST_VERSION_NUM.to_string(), TaggedValue::Integer(host.version_num));
        params.insert(
            PACKAGE_STRING.to_string(),
            TaggedValue::text(concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))),
        );
        params.insert(PACKAGE_VERSION.to_string(), TaggedValue::text(env!("CARGO_PKG_VERSION")));
        params.insert(INTERPRETER_VERSION.to_string(), TaggedValue::text(interpreter));
        params
    }

    fn constructor_failed(&self, message: String, params: &BTreeMap<String, TaggedValue>) -> ScanError {
        let err = ScanError::ConstructorFailed { message, parameters: display_parameters(params) };
        self.diagnostics.error(&format!("{}: {}", self.descriptor.label(), err));
        err
    }

    /// Open a runtime, load the wrapper class and construct the iterator.
    pub fn begin<F>(&mut self, host: &HostInfo, open_runtime: F) -> ScanResult<()>
    where
        F: FnOnce() -> Result<R, RuntimeException>,
    {
        if self.state != SessionState::Uninitialized {
            return Err(ScanError::InvalidState { state: self.state, operation: "begin" });
        }
        let label = self.descriptor.label();
        let mut runtime = open_runtime().map_err(ScanError::RuntimeOpen)?;

        let class = match &self.descriptor.mode {
            SourceMode::InlineScript(path) => runtime.load_script(path),
            SourceMode::RegisteredType(name) => runtime.resolve_type(name),
        }
        .map_err(|cause| ScanError::LoadFailed { label: label.clone(), cause })?;

        let params = self.constructor_parameters(host, runtime.interpreter_version());
        let arg = TaggedValue::Mapping(params.iter().map(|(k, v)| (TaggedValue::text(k), v.clone())).collect());

        let constructed = match runtime.call(class, "new", &[arg]) {
            Ok(TaggedValue::Opaque(o)) => TaggedValue::Opaque(o),
            Ok(other) => return Err(self.constructor_failed(format!("new returned {} instead of an object", other), &params)),
            Err(e) => return Err(self.constructor_failed(e.message, &params)),
        };
        let iterator = match runtime.retain(&constructed) {
            Ok(it) => it,
            Err(e) => return Err(self.constructor_failed(e.message, &params)),
        };
        runtime.reclaim();

        debug!(target: "scriptscan::session", "began scan of {} with {} parameters", label, params.len());
        self.runtime = Some(runtime);
        self.iterator = Some(iterator);
        self.parameters = params;
        self.rows_emitted = 0;
        self.state = SessionState::Active;
        Ok(())
    }

    /// Pull one row. `Ok(None)` means end of data.
    pub fn next(&mut self) -> ScanResult<Option<RowBuffer>> {
        let (runtime, iterator) = match (self.state, self.runtime.as_mut(), self.iterator) {
            (SessionState::Active, Some(rt), Some(it)) => (rt, it),
            (state, _, _) => return Err(ScanError::InvalidState { state, operation: "fetch a row" }),
        };
        // handles from the previous row are dead once the host has copied it
        runtime.reclaim();

        let output = match runtime.call(iterator, "each", &[]) {
            Ok(v) => v,
            Err(e) => {
                let err = ScanError::IterationFailed(e);
                self.diagnostics.error(&err.to_string());
                return Err(err);
            }
        };
        let mut row = RowBuffer::new();
        match materialize(runtime, &output, &mut row, self.diagnostics.as_ref()) {
            Ok(()) => {
                self.rows_emitted += 1;
                Ok(Some(row))
            }
            Err(RowError::NotASequence { inspected }) => {
                self.diagnostics.info(&format!("#each must provide a sequence (was {})", inspected));
                Ok(None)
            }
            Err(cause) => {
                let err = ScanError::Row { row: self.rows_emitted + 1, cause };
                self.diagnostics.error(&err.to_string());
                Err(err)
            }
        }
    }

    /// Restart requested by the host. The iterator keeps its position.
    pub fn rescan(&mut self) {
        self.diagnostics.info(&format!("rescanning {}; iterator position is kept", self.descriptor.label()));
    }

    /// Release the runtime. Safe to call in any state, any number of times.
    pub fn end(&mut self) {
        self.iterator = None;
        if let Some(runtime) = self.runtime.take() {
            debug!(target: "scriptscan::session", "ending scan of {} after {} rows", self.descriptor.label(), self.rows_emitted);
            drop(runtime);
        }
        self.state = SessionState::Closed;
    }

    /// Key/value lines for EXPLAIN output.
    pub fn explain(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        match &self.descriptor.mode {
            SourceMode::InlineScript(p) => out.push(("Wrapper Path".to_string(), p.display().to_string())),
            SourceMode::RegisteredType(n) => out.push(("Wrapper Class".to_string(), n.clone())),
        }
        out.push(("Wrapper Options".to_string(), self.descriptor.parameters.len().to_string()));
        if let Some(rt) = &self.runtime {
            out.push(("Interpreter".to_string(), rt.interpreter_version()));
        }
        out.push(("Rows Emitted".to_string(), self.rows_emitted.to_string()));
        out
    }
}

impl<R: ScriptRuntime> Drop for ScanSession<R> {
    fn drop(&mut self) { self.end(); }
}
