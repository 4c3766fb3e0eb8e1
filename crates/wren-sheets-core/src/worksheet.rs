//! Worksheet: a sparse cell grid with a live used-range

use crate::cell::{CellRange, CellValue};
use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use ahash::AHashMap;

/// A single worksheet
///
/// Storage is sparse; only cells with a value occupy memory. The used-range
/// bounds (`max_row`/`max_col`) always reflect the current contents, so
/// whole-row/whole-column references resolve against the live extent rather
/// than the extent at load time.
#[derive(Debug, Default)]
pub struct Worksheet {
    name: String,
    cells: AHashMap<(u32, u16), CellValue>,
    max_row: u32,
    max_col: u16,
}

impl Worksheet {
    /// Create a new empty worksheet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: AHashMap::new(),
            max_row: 0,
            max_col: 0,
        }
    }

    /// Sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Highest occupied row index (0 if the sheet is empty)
    pub fn max_row(&self) -> u32 {
        self.max_row
    }

    /// Highest occupied column index (0 if the sheet is empty)
    pub fn max_col(&self) -> u16 {
        self.max_col
    }

    /// Set a cell value by row/column index
    pub fn set_value_at(&mut self, row: u32, col: u16, value: impl Into<CellValue>) -> Result<()> {
        if row >= MAX_ROWS {
            return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
        }
        if col >= MAX_COLS {
            return Err(Error::ColumnOutOfBounds(col, MAX_COLS - 1));
        }
        let value = value.into();
        if value.is_empty() {
            self.cells.remove(&(row, col));
        } else {
            self.cells.insert((row, col), value);
            self.max_row = self.max_row.max(row);
            self.max_col = self.max_col.max(col);
        }
        Ok(())
    }

    /// Set a cell value by A1-style address
    pub fn set_value(&mut self, addr: &str, value: impl Into<CellValue>) -> Result<()> {
        let a = crate::CellAddress::parse(addr)?;
        self.set_value_at(a.row, a.col, value)
    }

    /// Get a cell value; missing cells read as `CellValue::Empty`
    pub fn value_at(&self, row: u32, col: u16) -> CellValue {
        self.cells.get(&(row, col)).cloned().unwrap_or_default()
    }

    /// Whether the cell holds no value
    pub fn is_blank(&self, row: u32, col: u16) -> bool {
        !self.cells.contains_key(&(row, col))
    }

    /// Clear every cell in a range
    pub fn clear_range(&mut self, range: &CellRange) {
        for addr in range.cells() {
            self.cells.remove(&(addr.row, addr.col));
        }
        self.recompute_bounds();
    }

    fn recompute_bounds(&mut self) {
        self.max_row = self.cells.keys().map(|&(r, _)| r).max().unwrap_or(0);
        self.max_col = self.cells.keys().map(|&(_, c)| c).max().unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sparse_storage() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value("B2", 1.5).unwrap();
        ws.set_value("D9", "x").unwrap();
        assert_eq!(ws.value_at(1, 1), CellValue::Number(1.5));
        assert_eq!(ws.value_at(0, 0), CellValue::Empty);
        assert_eq!(ws.max_row(), 8);
        assert_eq!(ws.max_col(), 3);
    }

    #[test]
    fn test_bounds_grow_and_shrink() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value_at(10, 2, 1.0).unwrap();
        assert_eq!(ws.max_row(), 10);
        ws.set_value_at(100, 5, 2.0).unwrap();
        assert_eq!((ws.max_row(), ws.max_col()), (100, 5));
        ws.clear_range(&CellRange::parse("F101").unwrap());
        assert_eq!((ws.max_row(), ws.max_col()), (10, 2));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut ws = Worksheet::new("Sheet1");
        assert!(ws.set_value_at(crate::MAX_ROWS, 0, 1.0).is_err());
        assert!(ws.set_value_at(0, crate::MAX_COLS, 1.0).is_err());
    }

    #[test]
    fn test_error_values_stored() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value_at(0, 0, CellError::Na).unwrap();
        assert_eq!(ws.value_at(0, 0), CellValue::Error(CellError::Na));
    }
}
