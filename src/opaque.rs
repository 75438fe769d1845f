//! Conversion of runtime-owned objects that carry no plain-data payload.
//!
//! Timestamp-like objects become microseconds since 2000-01-01 UTC (the
//! host's timestamp epoch). Every other object is stored as its type name,
//! with a warning so the lossy conversion is visible.

use crate::diagnostics::DiagnosticSink;
use crate::error::ConvertError;
use crate::row::{Cell, Datum};
use crate::runtime::ScriptRuntime;
use crate::value::{OpaqueValue, TaggedValue};

/// Runtime types converted through `to_i`.
pub const TIMESTAMP_TYPES: &[&str] = &["Time"];

const UNIX_EPOCH_JDATE: i64 = 2_440_588;
const HOST_EPOCH_JDATE: i64 = 2_451_545;
const USECS_PER_DAY: i64 = 86_400_000_000;

/// Microseconds between 1970-01-01 and 2000-01-01.
pub const EPOCH_OFFSET_USECS: i64 = (HOST_EPOCH_JDATE - UNIX_EPOCH_JDATE) * USECS_PER_DAY;

pub fn unix_seconds_to_host_usecs(seconds: i64) -> Result<i64, ConvertError> {
    seconds
        .checked_mul(1_000_000)
        .and_then(|us| us.checked_sub(EPOCH_OFFSET_USECS))
        .ok_or(ConvertError::TimestampOutOfRange { seconds })
}

fn seconds_of(type_name: &str, v: TaggedValue) -> Result<i64, ConvertError> {
    match v {
        TaggedValue::Integer(i) => Ok(i),
        TaggedValue::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(f as i64),
        other => Err(ConvertError::UnsupportedOpaqueType {
            type_name: type_name.to_string(),
            reason: format!("to_i returned {} ({})", other.kind_name(), other),
        }),
    }
}

pub fn handle<R: ScriptRuntime + ?Sized>(
    runtime: &mut R,
    value: &TaggedValue,
    opaque: &OpaqueValue,
    sink: &mut Cell,
    diagnostics: &dyn DiagnosticSink,
) -> Result<(), ConvertError> {
    let type_name = opaque.type_name.as_str();
    if TIMESTAMP_TYPES.contains(&type_name) {
        let seconds = seconds_of(type_name, runtime.invoke(value, "to_i")?)?;
        sink.set(Datum::Int64(unix_seconds_to_host_usecs(seconds)?));
        return Ok(());
    }
    if type_name.is_empty() {
        return Err(ConvertError::UnsupportedOpaqueType {
            type_name: String::new(),
            reason: "object has no type name to fall back on".to_string(),
        });
    }
    diagnostics.warn(&format!("unsupported foreign object of type {}; storing its type name", type_name));
    sink.set(Datum::Bytes(type_name.as_bytes().to_vec()));
    Ok(())
}
