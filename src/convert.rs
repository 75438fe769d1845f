//! Tagged value → destination cell.

use crate::diagnostics::DiagnosticSink;
use crate::error::ConvertError;
use crate::opaque;
use crate::row::{Cell, Datum};
use crate::runtime::ScriptRuntime;
use crate::value::TaggedValue;

/// Leading byte on text produced by inspecting a structured value, so it can
/// be told apart from a string the script returned.
pub const FALLBACK_TAG: u8 = b's';

fn tagged(rendered: String) -> Datum {
    let mut bytes = Vec::with_capacity(rendered.len() + 1);
    bytes.push(FALLBACK_TAG);
    bytes.extend_from_slice(rendered.as_bytes());
    Datum::Bytes(bytes)
}

/// Write `value` into `sink`. The cell is null on entry to every rule and is
/// left null on error.
pub fn convert<R: ScriptRuntime + ?Sized>(
    runtime: &mut R,
    value: &TaggedValue,
    sink: &mut Cell,
    diagnostics: &dyn DiagnosticSink,
) -> Result<(), ConvertError> {
    sink.set_null();
    match value {
        TaggedValue::Null | TaggedValue::Undefined => {}
        // false is stored as NULL; scripts rely on it to skip a column
        TaggedValue::Bool(false) => {}
        TaggedValue::Bool(true) => sink.set(Datum::Bool(true)),
        TaggedValue::Integer(i) => sink.set(Datum::Int64(*i)),
        TaggedValue::Float(f) => sink.set(Datum::Float64(*f)),
        TaggedValue::Text(bytes) => sink.set(Datum::Bytes(bytes.clone())),
        TaggedValue::Symbol(_) | TaggedValue::Callable | TaggedValue::Sequence(_) | TaggedValue::Mapping(_) => {
            let rendered = runtime.inspect(value)?;
            sink.set(tagged(rendered));
        }
        TaggedValue::TypeRef(_) => {
            let name = runtime.class_name(value)?;
            sink.set(Datum::Bytes(name.into_bytes()));
        }
        TaggedValue::Opaque(o) => {
            if let Err(e) = opaque::handle(runtime, value, o, sink, diagnostics) {
                sink.set_null();
                return Err(e);
            }
        }
        TaggedValue::Error(msg) => {
            return Err(ConvertError::UnsupportedValueKind { kind: "error", detail: msg.clone() });
        }
        TaggedValue::Unknown(tag) => return Err(ConvertError::UnknownValueKind(tag.clone())),
    }
    Ok(())
}
