//! The capability the scan needs from an embedded script runtime.
//!
//! A runtime evaluates methods on script objects and hands results back as
//! `TaggedValue`s. Anything the script raises comes back as a
//! `RuntimeException` holding only the rendered message, so native error
//! objects never escape the runtime.

use std::path::Path;

use thiserror::Error;

use crate::value::{ObjectRef, TaggedValue};

pub mod lua;

pub use lua::LuaRuntime;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuntimeException {
    pub message: String,
}

impl RuntimeException {
    pub fn new<S: Into<String>>(message: S) -> Self { Self { message: message.into() } }
}

pub trait ScriptRuntime {
    /// Version string of the embedded interpreter, e.g. `Lua 5.4`.
    fn interpreter_version(&self) -> String;

    /// Evaluate a script file; it must evaluate to the wrapper class.
    fn load_script(&mut self, path: &Path) -> Result<ObjectRef, RuntimeException>;

    /// Look up a wrapper class that is already registered in the runtime.
    fn resolve_type(&mut self, qualified_name: &str) -> Result<ObjectRef, RuntimeException>;

    /// Call `method` on a pinned object.
    fn call(&mut self, receiver: ObjectRef, method: &str, args: &[TaggedValue]) -> Result<TaggedValue, RuntimeException>;

    /// Call a zero-argument `method` on a value from the most recent call (typically an opaque).
    fn invoke(&mut self, value: &TaggedValue, method: &str) -> Result<TaggedValue, RuntimeException>;

    /// Pin a value so it stays valid for the rest of the runtime's life.
    fn retain(&mut self, value: &TaggedValue) -> Result<ObjectRef, RuntimeException>;

    /// Human-readable rendering of a value.
    fn inspect(&mut self, value: &TaggedValue) -> Result<String, RuntimeException>;

    /// Name of the value's class, as text.
    fn class_name(&mut self, value: &TaggedValue) -> Result<String, RuntimeException>;

    /// Drop every transient value handed out since the last reclaim.
    fn reclaim(&mut self);
}

impl<R: ScriptRuntime + ?Sized> ScriptRuntime for Box<R> {
    fn interpreter_version(&self) -> String { (**self).interpreter_version() }
    fn load_script(&mut self, path: &Path) -> Result<ObjectRef, RuntimeException> { (**self).load_script(path) }
    fn resolve_type(&mut self, qualified_name: &str) -> Result<ObjectRef, RuntimeException> { (**self).resolve_type(qualified_name) }
    fn call(&mut self, receiver: ObjectRef, method: &str, args: &[TaggedValue]) -> Result<TaggedValue, RuntimeException> {
        (**self).call(receiver, method, args)
    }
    fn invoke(&mut self, value: &TaggedValue, method: &str) -> Result<TaggedValue, RuntimeException> { (**self).invoke(value, method) }
    fn retain(&mut self, value: &TaggedValue) -> Result<ObjectRef, RuntimeException> { (**self).retain(value) }
    fn inspect(&mut self, value: &TaggedValue) -> Result<String, RuntimeException> { (**self).inspect(value) }
    fn class_name(&mut self, value: &TaggedValue) -> Result<String, RuntimeException> { (**self).class_name(value) }
    fn reclaim(&mut self) { (**self).reclaim() }
}
