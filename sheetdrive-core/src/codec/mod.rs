//! Cell codec
//!
//! Pure transformations between spreadsheet cells and typed values. Nothing
//! in here performs I/O, and apart from range parsing (which validates
//! caller input) nothing returns an error: malformed grids produce
//! structurally valid, possibly empty, results.

pub mod a1;
mod matching;
mod records;
mod value;

pub use a1::{column_index, column_letter, A1Range, CellRef, GridBounds};
pub use matching::{filter_records, matches, Condition, MatchMode};
pub use records::{
    grid_to_records, record_to_row, row_to_record, rows_to_records, Headers, Record, WriteData,
};
pub use value::CellValue;
