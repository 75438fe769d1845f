//! Destination cells and row buffers: the typed side of the marshaling layer.

use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    /// Owned copy of a text payload; never borrows runtime memory.
    Bytes(Vec<u8>),
}

impl Datum {
    pub fn kind(&self) -> DatumKind {
        match self {
            Datum::Bool(_) => DatumKind::Bool,
            Datum::Int64(_) => DatumKind::Int64,
            Datum::Float64(_) => DatumKind::Float64,
            Datum::Bytes(_) => DatumKind::Bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatumKind { Bool, Int64, Float64, Bytes }

impl Display for Datum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Bool(b) => write!(f, "{}", b),
            Datum::Int64(i) => write!(f, "{}", i),
            Datum::Float64(x) => write!(f, "{}", x),
            Datum::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

/// One destination cell: null, or a typed payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    datum: Option<Datum>,
}

impl Cell {
    pub fn null() -> Self { Self { datum: None } }
    pub fn of(datum: Datum) -> Self { Self { datum: Some(datum) } }

    #[inline]
    pub fn is_null(&self) -> bool { self.datum.is_none() }
    #[inline]
    pub fn datum(&self) -> Option<&Datum> { self.datum.as_ref() }

    pub fn set(&mut self, datum: Datum) { self.datum = Some(datum); }
    pub fn set_null(&mut self) { self.datum = None; }

    pub fn into_datum(self) -> Option<Datum> { self.datum }
}

/// Cells for a single produced row. Its width follows the sequence the script
/// returned for that iteration; successive rows may differ in width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBuffer {
    cells: Vec<Cell>,
}

impl RowBuffer {
    pub fn new() -> Self { Self::default() }

    /// Resize to `width` cells, all null.
    pub fn reset(&mut self, width: usize) {
        self.cells.clear();
        self.cells.resize(width, Cell::null());
    }

    pub fn len(&self) -> usize { self.cells.len() }
    pub fn is_empty(&self) -> bool { self.cells.is_empty() }
    pub fn cells(&self) -> &[Cell] { &self.cells }
    pub fn cell(&self, idx: usize) -> Option<&Cell> { self.cells.get(idx) }
    pub fn cell_mut(&mut self, idx: usize) -> Option<&mut Cell> { self.cells.get_mut(idx) }
    pub fn into_cells(self) -> Vec<Cell> { self.cells }
}

impl FromIterator<Cell> for RowBuffer {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self { Self { cells: iter.into_iter().collect() } }
}
