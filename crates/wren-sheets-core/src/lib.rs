//! # wren-sheets-core
//!
//! Workbook and worksheet model for the wren-sheets formula engine.
//!
//! This crate provides the types the formula subsystem resolves against:
//! - [`CellAddress`] and [`CellRange`] — cell addressing
//! - [`CellValue`] and [`CellError`] — typed cell contents and the
//!   spreadsheet error codes
//! - [`Worksheet`] — a sparse cell grid with a live used-range
//! - [`Workbook`] — ordered sheets, defined names, and the external-sheet
//!   indirection table consumed by 3-D references
//!
//! ## Example
//!
//! ```rust
//! use wren_sheets_core::{Workbook, CellValue};
//!
//! let mut wb = Workbook::new();
//! let sheet = wb.sheet_mut(0).unwrap();
//! sheet.set_value("A1", 42.0).unwrap();
//! assert_eq!(sheet.value_at(0, 0), CellValue::Number(42.0));
//! ```

pub mod cell;
pub mod error;
pub mod workbook;
pub mod worksheet;

pub use cell::{CellAddress, CellError, CellRange, CellValue};
pub use error::{Error, Result};
pub use workbook::{DefinedName, SheetSpan, Workbook, DELETED_SHEET};
pub use worksheet::Worksheet;

/// Maximum number of rows in a worksheet (BIFF8 limit)
pub const MAX_ROWS: u32 = 65_536;

/// Maximum number of columns in a worksheet (BIFF8 limit)
pub const MAX_COLS: u16 = 256;
