//! Workbook: ordered sheets, defined names, and the external-sheet table

use crate::cell::CellRange;
use crate::error::{Error, Result};
use crate::worksheet::Worksheet;

/// Sentinel sheet index marking a deleted sheet in a [`SheetSpan`]
pub const DELETED_SHEET: u16 = 0xFFFF;

/// A first/last sheet pair from the external-sheet table
///
/// 3-D formula tokens do not store sheet numbers directly; they store a
/// signed index into this table. `first == last` is a same-sheet span.
/// Either slot may hold [`DELETED_SHEET`], in which case the span must
/// resolve to a reference error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetSpan {
    /// First sheet in workbook order
    pub first: u16,
    /// Last sheet in workbook order
    pub last: u16,
}

impl SheetSpan {
    /// Create a span covering a single sheet
    pub fn single(sheet: u16) -> Self {
        Self {
            first: sheet,
            last: sheet,
        }
    }

    /// Whether either end points at a deleted sheet
    pub fn is_deleted(&self) -> bool {
        self.first == DELETED_SHEET || self.last == DELETED_SHEET
    }
}

/// A defined name (named range)
#[derive(Debug, Clone)]
pub struct DefinedName {
    /// The name as entered (case preserved; lookup is case-insensitive)
    pub name: String,
    /// Sheet index the name is scoped to, or `None` for workbook scope
    pub scope: Option<usize>,
    /// The sheet the target range lives on
    pub sheet: usize,
    /// The target range
    pub target: CellRange,
}

/// A workbook: the collaborator surface the formula engine queries
#[derive(Debug, Default)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
    names: Vec<DefinedName>,
    /// External-sheet indirection table, indexed by the `ixti` stored in
    /// 3-D tokens
    sheet_spans: Vec<SheetSpan>,
    /// Add-in / external function names, indexed by name-token index (1-based)
    external_names: Vec<String>,
}

impl Workbook {
    /// Create an empty workbook with one sheet
    pub fn new() -> Self {
        let mut wb = Self::default();
        wb.sheets.push(Worksheet::new("Sheet1"));
        wb
    }

    /// Create an empty workbook with no sheets
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a sheet, returning its index
    pub fn add_sheet(&mut self, name: impl Into<String>) -> Result<usize> {
        let name = name.into();
        if self.sheet_index(&name).is_some() {
            return Err(Error::DuplicateSheetName(name));
        }
        self.sheets.push(Worksheet::new(name));
        Ok(self.sheets.len() - 1)
    }

    /// Number of sheets
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Get a sheet by index
    pub fn sheet(&self, index: usize) -> Option<&Worksheet> {
        self.sheets.get(index)
    }

    /// Get a sheet mutably by index
    pub fn sheet_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.sheets.get_mut(index)
    }

    /// Find a sheet index by name (case-insensitive)
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Register an external-sheet span, returning its table index
    pub fn add_sheet_span(&mut self, span: SheetSpan) -> i16 {
        self.sheet_spans.push(span);
        (self.sheet_spans.len() - 1) as i16
    }

    /// Resolve a signed external-sheet index to its span
    ///
    /// Negative indices address the internal sheet list directly:
    /// `-1` means "current sheet" and is resolved by the caller; other
    /// negative values are unresolvable here.
    pub fn resolve_sheet_span(&self, ixti: i16) -> Option<SheetSpan> {
        if ixti < 0 {
            return None;
        }
        self.sheet_spans.get(ixti as usize).copied()
    }

    /// Define a name, returning its 1-based index (as stored in name tokens)
    pub fn define_name(
        &mut self,
        name: impl Into<String>,
        scope: Option<usize>,
        sheet: usize,
        target: CellRange,
    ) -> Result<u16> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidName(name));
        }
        self.names.push(DefinedName {
            name,
            scope,
            sheet,
            target,
        });
        Ok(self.names.len() as u16)
    }

    /// Look up a defined name by its 1-based token index
    pub fn name_by_index(&self, index: u16) -> Option<&DefinedName> {
        if index == 0 {
            return None;
        }
        self.names.get(index as usize - 1)
    }

    /// Look up a defined name by text (case-insensitive), preferring a
    /// sheet-scoped match over a workbook-scoped one
    pub fn lookup_name(&self, text: &str, sheet: usize) -> Option<&DefinedName> {
        self.names
            .iter()
            .find(|n| n.scope == Some(sheet) && n.name.eq_ignore_ascii_case(text))
            .or_else(|| {
                self.names
                    .iter()
                    .find(|n| n.scope.is_none() && n.name.eq_ignore_ascii_case(text))
            })
    }

    /// Register an add-in/external function name, returning its 1-based index
    pub fn add_external_name(&mut self, name: impl Into<String>) -> u16 {
        self.external_names.push(name.into());
        self.external_names.len() as u16
    }

    /// Look up an external name by its 1-based token index
    pub fn external_name(&self, index: u16) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.external_names.get(index as usize - 1).map(|s| s.as_str())
    }
}
