//! Drain a scan session into a polars `DataFrame`.
//!
//! Rows from a script may differ in width; the frame is as wide as the widest
//! row and shorter rows are padded with nulls. Each column is typed from the
//! data it actually holds.

use polars::prelude::*;

use crate::error::ScanResult;
use crate::row::{Cell, Datum, DatumKind};
use crate::runtime::ScriptRuntime;
use crate::session::ScanSession;
use crate::tprintln;

#[derive(Debug, Clone, Default)]
pub struct FrameOptions {
    /// Names for the leading columns; positions past the list are `column_<i>`.
    pub columns: Vec<String>,
    /// Stop after this many rows.
    pub limit: Option<usize>,
}

fn column_name(options: &FrameOptions, idx: usize) -> String {
    options.columns.get(idx).cloned().unwrap_or_else(|| format!("column_{}", idx + 1))
}

fn column_kind(cells: &[Option<&Datum>]) -> Option<DatumKind> {
    let mut kinds = cells.iter().flatten().map(|d| d.kind());
    let first = kinds.next()?;
    if kinds.all(|k| k == first) { Some(first) } else { None }
}

fn build_series(name: &str, cells: &[Option<&Datum>]) -> Series {
    match column_kind(cells) {
        Some(DatumKind::Bool) => {
            let v: Vec<Option<bool>> = cells.iter().map(|c| match c { Some(Datum::Bool(b)) => Some(*b), _ => None }).collect();
            Series::new(name.into(), v)
        }
        Some(DatumKind::Int64) => {
            let v: Vec<Option<i64>> = cells.iter().map(|c| match c { Some(Datum::Int64(i)) => Some(*i), _ => None }).collect();
            Series::new(name.into(), v)
        }
        Some(DatumKind::Float64) => {
            let v: Vec<Option<f64>> = cells.iter().map(|c| match c { Some(Datum::Float64(x)) => Some(*x), _ => None }).collect();
            Series::new(name.into(), v)
        }
        // text, mixed kinds, and all-null columns
        Some(DatumKind::Bytes) | None => {
            let v: Vec<Option<String>> = cells.iter().map(|c| c.map(|d| d.to_string())).collect();
            Series::new(name.into(), v)
        }
    }
}

/// Assemble rows of cells into a frame.
pub fn rows_to_frame(rows: &[Vec<Cell>], options: &FrameOptions) -> PolarsResult<DataFrame> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(options.columns.len());
    let mut cols: Vec<Column> = Vec::with_capacity(width);
    for idx in 0..width {
        let cells: Vec<Option<&Datum>> = rows.iter().map(|r| r.get(idx).and_then(Cell::datum)).collect();
        cols.push(build_series(&column_name(options, idx), &cells).into());
    }
    DataFrame::new(cols)
}

/// Pull rows until end of data (or `limit`) and build a frame from them.
pub fn collect_frame<R: ScriptRuntime>(session: &mut ScanSession<R>, options: &FrameOptions) -> ScanResult<DataFrame> {
    let mut rows: Vec<Vec<Cell>> = Vec::new();
    while options.limit.map_or(true, |n| rows.len() < n) {
        match session.next()? {
            Some(row) => rows.push(row.into_cells()),
            None => break,
        }
    }
    tprintln!("[frame] collected {} row(s) from {}", rows.len(), session.descriptor().label());
    Ok(rows_to_frame(&rows, options)?)
}
