//! Tagged values produced by the embedded script runtime.
//!
//! A `TaggedValue` is an owned snapshot of one runtime value. Primitive payloads
//! are copied out of the runtime when the value is lowered; anything the runtime
//! keeps ownership of (objects, userdata, coroutines) is represented by an
//! `OpaqueValue` whose handle is only meaningful to the runtime that produced it
//! and only until that runtime reclaims its transient values.

use std::fmt::{self, Display, Formatter, Write as _};

/// Index into a runtime's transient value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpaqueHandle(pub usize);

/// Index into a runtime's pinned object table (lives as long as the runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueValue {
    /// Display name of the value's runtime type, e.g. `Time`.
    pub type_name: String,
    pub handle: OpaqueHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(Vec<u8>),
    Symbol(Vec<u8>),
    Sequence(Vec<TaggedValue>),
    Mapping(Vec<(TaggedValue, TaggedValue)>),
    Opaque(OpaqueValue),
    Callable,
    TypeRef(String),
    Undefined,
    Error(String),
    /// A runtime tag this crate has no model for; carries the runtime's tag name.
    Unknown(String),
}

impl TaggedValue {
    pub fn text<S: AsRef<str>>(s: S) -> Self { TaggedValue::Text(s.as_ref().as_bytes().to_vec()) }

    /// Short kind label used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            TaggedValue::Null => "null",
            TaggedValue::Bool(_) => "bool",
            TaggedValue::Integer(_) => "integer",
            TaggedValue::Float(_) => "float",
            TaggedValue::Text(_) => "text",
            TaggedValue::Symbol(_) => "symbol",
            TaggedValue::Sequence(_) => "sequence",
            TaggedValue::Mapping(_) => "mapping",
            TaggedValue::Opaque(_) => "opaque",
            TaggedValue::Callable => "callable",
            TaggedValue::TypeRef(_) => "typeref",
            TaggedValue::Undefined => "undefined",
            TaggedValue::Error(_) => "error",
            TaggedValue::Unknown(_) => "unknown",
        }
    }

    pub fn as_sequence(&self) -> Option<&[TaggedValue]> {
        match self { TaggedValue::Sequence(items) => Some(items), _ => None }
    }
}

fn is_identifier(bytes: &[u8]) -> bool {
    match bytes.split_first() {
        Some((first, rest)) => {
            (first.is_ascii_alphabetic() || *first == b'_')
                && rest.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_')
        }
        None => false,
    }
}

fn write_quoted(f: &mut Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_char('"')?;
    for ch in String::from_utf8_lossy(bytes).chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_control() => write!(f, "\\{}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

/// Lua table-constructor style rendering; this is what "inspect" produces for
/// values that carry no runtime object.
impl Display for TaggedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TaggedValue::Null => f.write_str("nil"),
            TaggedValue::Undefined => f.write_str("undefined"),
            TaggedValue::Bool(b) => write!(f, "{}", b),
            TaggedValue::Integer(i) => write!(f, "{}", i),
            TaggedValue::Float(x) => {
                if x.is_nan() { f.write_str("nan") }
                else if x.is_infinite() { f.write_str(if *x > 0.0 { "inf" } else { "-inf" }) }
                else { write!(f, "{:?}", x) }
            }
            TaggedValue::Text(bytes) => write_quoted(f, bytes),
            TaggedValue::Symbol(name) => write!(f, ":{}", String::from_utf8_lossy(name)),
            TaggedValue::Sequence(items) => {
                f.write_char('{')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { f.write_str(", ")?; }
                    write!(f, "{}", item)?;
                }
                f.write_char('}')
            }
            TaggedValue::Mapping(pairs) => {
                f.write_char('{')?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 { f.write_str(", ")?; }
                    match k {
                        TaggedValue::Text(name) if is_identifier(name) => {
                            write!(f, "{} = {}", String::from_utf8_lossy(name), v)?
                        }
                        _ => write!(f, "[{}] = {}", k, v)?,
                    }
                }
                f.write_char('}')
            }
            TaggedValue::Opaque(o) => write!(f, "#<{}>", o.type_name),
            TaggedValue::Callable => f.write_str("function"),
            TaggedValue::TypeRef(name) => f.write_str(name),
            TaggedValue::Error(msg) => write!(f, "error: {}", msg),
            TaggedValue::Unknown(tag) => write!(f, "<{}>", tag),
        }
    }
}
