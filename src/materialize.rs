//! One `each` result → one row buffer.

use crate::convert::convert;
use crate::diagnostics::DiagnosticSink;
use crate::error::RowError;
use crate::row::RowBuffer;
use crate::runtime::ScriptRuntime;
use crate::value::TaggedValue;

/// Fill `dest` from a row value. `dest` takes the sequence's length; its
/// contents are unspecified after an error.
pub fn materialize<R: ScriptRuntime + ?Sized>(
    runtime: &mut R,
    row: &TaggedValue,
    dest: &mut RowBuffer,
    diagnostics: &dyn DiagnosticSink,
) -> Result<(), RowError> {
    let items = match row.as_sequence() {
        Some(items) => items,
        None => {
            let inspected = runtime.inspect(row).unwrap_or_else(|e| format!("{} (inspect failed: {})", row, e));
            return Err(RowError::NotASequence { inspected });
        }
    };
    dest.reset(items.len());
    for (index, item) in items.iter().enumerate() {
        let Some(cell) = dest.cell_mut(index) else { break };
        convert(runtime, item, cell, diagnostics).map_err(|cause| RowError::ElementFailed { index, cause })?;
    }
    Ok(())
}
