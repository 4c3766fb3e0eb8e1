//! Reference resolver
//!
//! Turns range-shaped tokens into ordered, deduplicated sequences of
//! single-cell references, and resolves the sheet(s) a token addresses.
//! Every failure mode here is a typed [`CellError`] value propagated by the
//! caller; resolution never panics and never throws across the evaluation
//! boundary.

use crate::memfunc::RefExpr;
use crate::token::{AreaRef, CellRef, Token};
use ahash::AHashSet;
use wren_sheets_core::{
    CellAddress, CellError, CellRange, CellValue, Workbook, MAX_COLS, MAX_ROWS,
};

/// A resolved range: a concrete sheet span plus the stored area
///
/// The area keeps its whole-row/column flags; bounds substitution happens
/// at expansion time against each sheet's live extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SheetRange {
    /// First sheet index, in workbook order
    pub first_sheet: usize,
    /// Last sheet index, in workbook order
    pub last_sheet: usize,
    /// The referenced rectangle
    pub area: AreaRef,
}

/// One cell produced by expansion
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCell {
    /// Sheet index
    pub sheet: usize,
    /// Cell coordinates
    pub addr: CellAddress,
    /// The cell's current value
    pub value: CellValue,
}

/// Context a token is resolved in: the owning cell and its sheet
#[derive(Debug, Clone, Copy)]
pub struct ResolveCtx<'a> {
    /// The workbook being queried
    pub workbook: &'a Workbook,
    /// Sheet the formula lives on
    pub sheet: usize,
    /// The cell that owns the formula (anchor for shared-formula offsets)
    pub anchor: CellAddress,
}

impl<'a> ResolveCtx<'a> {
    /// Create a resolution context
    pub fn new(workbook: &'a Workbook, sheet: usize, anchor: CellAddress) -> Self {
        Self {
            workbook,
            sheet,
            anchor,
        }
    }

    /// Apply a shared-formula offset reference against the anchor cell.
    ///
    /// Relative components add the anchor's coordinates and wrap modulo the
    /// sheet limits; absolute components are taken as stored.
    pub fn offset_ref(&self, r: &CellRef) -> CellRef {
        let row = if r.row_rel {
            r.row.wrapping_add(self.anchor.row as u16)
        } else {
            r.row
        };
        let col = if r.col_rel {
            ((u32::from(r.col) + u32::from(self.anchor.col)) % u32::from(MAX_COLS)) as u16
        } else {
            r.col
        };
        CellRef {
            row,
            col,
            row_rel: r.row_rel,
            col_rel: r.col_rel,
            whole_row: false,
            whole_col: false,
        }
    }

    /// Resolve a token to its sheet ranges.
    ///
    /// Single references resolve to a one-cell range. Error-reference
    /// tokens and unresolvable sheet indices are `#REF!`; an unknown name
    /// index is `#NAME?`; a malformed reference sub-expression is
    /// `#VALUE!`.
    pub fn ranges_of(&self, token: &Token) -> Result<Vec<SheetRange>, CellError> {
        match token {
            Token::Ref(r) => Ok(vec![self.local_range(AreaRef::new(*r, *r))]),
            Token::Area(a) => Ok(vec![self.local_range(*a)]),
            Token::RefN(r) => {
                let eff = self.offset_ref(r);
                Ok(vec![self.local_range(AreaRef::new(eff, eff))])
            }
            Token::AreaN(a) => {
                let eff = AreaRef::new(self.offset_ref(&a.first), self.offset_ref(&a.last));
                Ok(vec![self.local_range(eff)])
            }
            Token::Ref3d { ixti, cell } => {
                let (first, last) = self.sheet_span(*ixti)?;
                Ok(vec![SheetRange {
                    first_sheet: first,
                    last_sheet: last,
                    area: AreaRef::new(*cell, *cell),
                }])
            }
            Token::Area3d { ixti, area } => {
                let (first, last) = self.sheet_span(*ixti)?;
                Ok(vec![SheetRange {
                    first_sheet: first,
                    last_sheet: last,
                    area: *area,
                }])
            }
            Token::RefErr
            | Token::AreaErr
            | Token::RefErr3d { .. }
            | Token::AreaErr3d { .. } => Err(CellError::Ref),
            Token::Name { index } => {
                let name = self
                    .workbook
                    .name_by_index(*index)
                    .ok_or(CellError::Name)?;
                Ok(vec![SheetRange {
                    first_sheet: name.sheet,
                    last_sheet: name.sheet,
                    area: AreaRef::from_range(name.target),
                }])
            }
            Token::MemFunc(subex) => {
                let expr = RefExpr::from_postfix(subex).map_err(|_| CellError::Value)?;
                self.eval_ref_expr(&expr)
            }
            Token::MemArea { ranges, subex } => {
                // the sub-expression is authoritative; the cached rectangle
                // list is only trusted when there is nothing to recompute
                if subex.is_empty() {
                    Ok(ranges
                        .iter()
                        .map(|a| self.local_range(*a))
                        .collect())
                } else {
                    let expr = RefExpr::from_postfix(subex).map_err(|_| CellError::Value)?;
                    self.eval_ref_expr(&expr)
                }
            }
            _ => Err(CellError::Value),
        }
    }

    /// Expand a token to its ordered, deduplicated cell sequence.
    ///
    /// Order is sheets in workbook order, then columns outer, rows inner
    /// (column-major). Corners stored reversed on either axis expand to the
    /// same cell set.
    pub fn cells_of(&self, token: &Token) -> Result<Vec<ResolvedCell>, CellError> {
        let ranges = self.ranges_of(token)?;
        self.expand_all(&ranges)
    }

    /// Expand a list of resolved ranges, deduplicating across overlaps.
    pub fn expand_all(&self, ranges: &[SheetRange]) -> Result<Vec<ResolvedCell>, CellError> {
        let mut seen: AHashSet<(usize, u32, u16)> = AHashSet::new();
        let mut cells = Vec::new();
        for range in ranges {
            self.expand_into(range, &mut seen, &mut cells)?;
        }
        Ok(cells)
    }

    fn expand_into(
        &self,
        range: &SheetRange,
        seen: &mut AHashSet<(usize, u32, u16)>,
        out: &mut Vec<ResolvedCell>,
    ) -> Result<(), CellError> {
        if range.first_sheet > range.last_sheet {
            return Err(CellError::Ref);
        }
        for sheet_ix in range.first_sheet..=range.last_sheet {
            let sheet = self.workbook.sheet(sheet_ix).ok_or(CellError::Ref)?;
            let bounds = normalized_bounds(&range.area, sheet.max_row(), sheet.max_col())?;
            for col in bounds.start.col..=bounds.end.col {
                for row in bounds.start.row..=bounds.end.row {
                    if seen.insert((sheet_ix, row, col)) {
                        out.push(ResolvedCell {
                            sheet: sheet_ix,
                            addr: CellAddress::new(row, col),
                            value: sheet.value_at(row, col),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluate a reference expression to its final set of ranges.
    ///
    /// Union concatenates, range takes the bounding box, intersection
    /// intersects pairwise; an empty intersection is `#NULL!`.
    pub fn eval_ref_expr(&self, expr: &RefExpr) -> Result<Vec<SheetRange>, CellError> {
        match expr {
            RefExpr::Leaf(token) => self.ranges_of(token),
            RefExpr::Named(name) => {
                let def = self
                    .workbook
                    .lookup_name(name, self.sheet)
                    .ok_or(CellError::Name)?;
                Ok(vec![SheetRange {
                    first_sheet: def.sheet,
                    last_sheet: def.sheet,
                    area: AreaRef::from_range(def.target),
                }])
            }
            RefExpr::Union(l, r) => {
                let mut ranges = self.eval_ref_expr(l)?;
                ranges.extend(self.eval_ref_expr(r)?);
                Ok(ranges)
            }
            RefExpr::Range(l, r) => {
                let left = self.eval_ref_expr(l)?;
                let right = self.eval_ref_expr(r)?;
                self.range_lists(&left, &right)
            }
            RefExpr::Isect(l, r) => {
                let left = self.eval_ref_expr(l)?;
                let right = self.eval_ref_expr(r)?;
                self.isect_lists(&left, &right)
            }
        }
    }

    /// The `:` operator over resolved operands: one bounding box
    pub fn range_lists(
        &self,
        left: &[SheetRange],
        right: &[SheetRange],
    ) -> Result<Vec<SheetRange>, CellError> {
        let (a, b) = match (bounding_box(left), bounding_box(right)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(CellError::Ref),
        };
        Ok(vec![merge_bounds(&a, &b)])
    }

    /// The intersection operator over resolved operands; empty is `#NULL!`
    pub fn isect_lists(
        &self,
        left: &[SheetRange],
        right: &[SheetRange],
    ) -> Result<Vec<SheetRange>, CellError> {
        let mut result = Vec::new();
        for a in left {
            for b in right {
                if let Some(ix) = self.intersect(a, b)? {
                    result.push(ix);
                }
            }
        }
        if result.is_empty() {
            Err(CellError::Null)
        } else {
            Ok(result)
        }
    }

    fn intersect(&self, a: &SheetRange, b: &SheetRange) -> Result<Option<SheetRange>, CellError> {
        let first_sheet = a.first_sheet.max(b.first_sheet);
        let last_sheet = a.last_sheet.min(b.last_sheet);
        if first_sheet > last_sheet {
            return Ok(None);
        }
        let sheet = self.workbook.sheet(first_sheet).ok_or(CellError::Ref)?;
        let ra = normalized_bounds(&a.area, sheet.max_row(), sheet.max_col())?;
        let rb = normalized_bounds(&b.area, sheet.max_row(), sheet.max_col())?;
        let start_row = ra.start.row.max(rb.start.row);
        let end_row = ra.end.row.min(rb.end.row);
        let start_col = ra.start.col.max(rb.start.col);
        let end_col = ra.end.col.min(rb.end.col);
        if start_row > end_row || start_col > end_col {
            return Ok(None);
        }
        Ok(Some(SheetRange {
            first_sheet,
            last_sheet,
            area: AreaRef::from_range(CellRange::new(
                CellAddress::new(start_row, start_col),
                CellAddress::new(end_row, end_col),
            )),
        }))
    }

    fn local_range(&self, area: AreaRef) -> SheetRange {
        SheetRange {
            first_sheet: self.sheet,
            last_sheet: self.sheet,
            area,
        }
    }

    fn sheet_span(&self, ixti: i16) -> Result<(usize, usize), CellError> {
        if ixti < 0 {
            // negative indices address the formula's own sheet through the
            // internal sheet list, not a literal table entry
            return Ok((self.sheet, self.sheet));
        }
        let span = self
            .workbook
            .resolve_sheet_span(ixti)
            .ok_or(CellError::Ref)?;
        if span.is_deleted() {
            return Err(CellError::Ref);
        }
        let first = span.first.min(span.last) as usize;
        let last = span.first.max(span.last) as usize;
        if last >= self.workbook.sheet_count() {
            return Err(CellError::Ref);
        }
        Ok((first, last))
    }
}

/// Normalize an area to concrete min/max bounds against a sheet's current
/// extent.
///
/// Whole-row/column corners substitute the live `max_row`/`max_col` here,
/// at resolution time; the same token expands to more cells after the sheet
/// grows. A corner beyond the sheet limits is a reference error.
fn normalized_bounds(area: &AreaRef, max_row: u32, max_col: u16) -> Result<CellRange, CellError> {
    let whole_col = area.first.whole_col || area.last.whole_col;
    let whole_row = area.first.whole_row || area.last.whole_row;

    let (start_row, end_row) = if whole_col {
        (0, max_row)
    } else {
        let (a, b) = (u32::from(area.first.row), u32::from(area.last.row));
        (a.min(b), a.max(b))
    };
    let (start_col, end_col) = if whole_row {
        (0, max_col)
    } else {
        let (a, b) = (area.first.col, area.last.col);
        (a.min(b), a.max(b))
    };

    if end_row >= MAX_ROWS && !whole_col {
        return Err(CellError::Ref);
    }
    if end_col >= MAX_COLS && !whole_row {
        return Err(CellError::Ref);
    }

    Ok(CellRange::new(
        CellAddress::new(start_row, start_col),
        CellAddress::new(end_row, end_col),
    ))
}

fn bounding_box(ranges: &[SheetRange]) -> Option<SheetRange> {
    let mut iter = ranges.iter();
    let first = *iter.next()?;
    Some(iter.fold(first, |acc, r| merge_bounds(&acc, r)))
}

fn merge_bounds(a: &SheetRange, b: &SheetRange) -> SheetRange {
    let ra = a.area.to_range();
    let rb = b.area.to_range();
    let start = CellAddress::new(
        ra.start.row.min(rb.start.row),
        ra.start.col.min(rb.start.col),
    );
    let end = CellAddress::new(ra.end.row.max(rb.end.row), ra.end.col.max(rb.end.col));
    SheetRange {
        first_sheet: a.first_sheet.min(b.first_sheet),
        last_sheet: a.last_sheet.max(b.last_sheet),
        area: AreaRef::from_range(CellRange::new(start, end)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wren_sheets_core::SheetSpan;

    fn wb_with_values() -> Workbook {
        let mut wb = Workbook::new();
        let ws = wb.sheet_mut(0).unwrap();
        for (addr, v) in [("B2", 1.0), ("B3", 2.0), ("B4", 3.0), ("C2", 4.0), ("C3", 5.0), ("C4", 6.0)]
        {
            ws.set_value(addr, v).unwrap();
        }
        wb
    }

    fn ctx(wb: &Workbook) -> ResolveCtx<'_> {
        ResolveCtx::new(wb, 0, CellAddress::new(0, 0))
    }

    fn area(text: &str) -> AreaRef {
        AreaRef::from_range(CellRange::parse(text).unwrap())
    }

    fn addrs(cells: &[ResolvedCell]) -> Vec<String> {
        cells.iter().map(|c| c.addr.to_a1_string()).collect()
    }

    #[test]
    fn test_expansion_is_column_major() {
        let wb = wb_with_values();
        let cells = ctx(&wb).cells_of(&Token::Area(area("B2:C4"))).unwrap();
        assert_eq!(addrs(&cells), vec!["B2", "B3", "B4", "C2", "C3", "C4"]);
    }

    #[test]
    fn test_reversed_corners_expand_the_same() {
        let wb = wb_with_values();
        // C4:B2 stored literally, first > last on both axes
        let reversed = AreaRef::new(
            CellRef::new(3, 2), // C4
            CellRef::new(1, 1), // B2
        );
        let cells = ctx(&wb).cells_of(&Token::Area(reversed)).unwrap();
        assert_eq!(addrs(&cells), vec!["B2", "B3", "B4", "C2", "C3", "C4"]);
    }

    #[test]
    fn test_whole_column_tracks_live_bounds() {
        let mut wb = wb_with_values();
        let mut last = CellRef::absolute(0, 1);
        last.whole_col = true;
        let token = Token::Area(AreaRef::new(CellRef::absolute(0, 1), last));

        let before = ctx(&wb).cells_of(&token).unwrap();
        assert_eq!(before.len(), 4); // rows 0..=3 (max_row is 3)

        wb.sheet_mut(0).unwrap().set_value("A20", 9.0).unwrap();
        let after = ctx(&wb).cells_of(&token).unwrap();
        assert_eq!(after.len(), 20); // sheet grew, same token expands further
    }

    #[test]
    fn test_shared_formula_offset_follows_anchor() {
        let mut wb = Workbook::new();
        wb.sheet_mut(0).unwrap().set_value("D10", 7.0).unwrap();
        wb.sheet_mut(0).unwrap().set_value("D11", 8.0).unwrap();

        let token = Token::RefN(CellRef::new(0, 0)); // offset (0,0), both relative

        let at_d10 = ResolveCtx::new(&wb, 0, CellAddress::parse("D10").unwrap());
        let cells = at_d10.cells_of(&token).unwrap();
        assert_eq!(addrs(&cells), vec!["D10"]);

        let at_d11 = ResolveCtx::new(&wb, 0, CellAddress::parse("D11").unwrap());
        let cells = at_d11.cells_of(&token).unwrap();
        assert_eq!(addrs(&cells), vec!["D11"]);
    }

    #[test]
    fn test_shared_formula_column_wraps() {
        let wb = Workbook::new();
        // stored col offset 255 + anchor col 2 wraps modulo 256 to column 1
        let token = Token::RefN(CellRef::new(0, 255));
        let at_c1 = ResolveCtx::new(&wb, 0, CellAddress::parse("C1").unwrap());
        let cells = at_c1.cells_of(&token).unwrap();
        assert_eq!(addrs(&cells), vec!["B1"]);
    }

    #[test]
    fn test_3d_range_iterates_sheets_in_order() {
        let mut wb = Workbook::new();
        wb.add_sheet("S2").unwrap();
        wb.add_sheet("S3").unwrap();
        for i in 0..3 {
            wb.sheet_mut(i).unwrap().set_value("A1", i as f64).unwrap();
        }
        let ixti = wb.add_sheet_span(SheetSpan { first: 0, last: 2 });

        let token = Token::Area3d {
            ixti,
            area: area("A1"),
        };
        let cells = ctx(&wb).cells_of(&token).unwrap();
        assert_eq!(cells.len(), 3);
        assert_eq!(
            cells.iter().map(|c| c.sheet).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(cells[2].value, CellValue::Number(2.0));
    }

    #[test]
    fn test_deleted_sheet_is_ref_error() {
        let mut wb = Workbook::new();
        let ixti = wb.add_sheet_span(SheetSpan {
            first: wren_sheets_core::DELETED_SHEET,
            last: 0,
        });
        let token = Token::Ref3d {
            ixti,
            cell: CellRef::new(0, 0),
        };
        assert_eq!(ctx(&wb).cells_of(&token), Err(CellError::Ref));
    }

    #[test]
    fn test_negative_sheet_index_means_own_sheet() {
        let mut wb = Workbook::new();
        wb.sheet_mut(0).unwrap().set_value("B2", 9.0).unwrap();
        let token = Token::Ref3d {
            ixti: -1,
            cell: CellRef::new(1, 1),
        };
        let cells = ctx(&wb).cells_of(&token).unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].value, CellValue::Number(9.0));
    }

    #[test]
    fn test_unknown_sheet_span_is_ref_error() {
        let wb = Workbook::new();
        let token = Token::Ref3d {
            ixti: 5,
            cell: CellRef::new(0, 0),
        };
        assert_eq!(ctx(&wb).cells_of(&token), Err(CellError::Ref));
    }

    #[test]
    fn test_error_tokens_resolve_to_ref_error() {
        let wb = Workbook::new();
        for token in [
            Token::RefErr,
            Token::AreaErr,
            Token::RefErr3d { ixti: 0 },
            Token::AreaErr3d { ixti: 0 },
        ] {
            assert_eq!(ctx(&wb).ranges_of(&token), Err(CellError::Ref));
        }
    }

    #[test]
    fn test_unknown_name_is_name_error() {
        let wb = Workbook::new();
        assert_eq!(
            ctx(&wb).ranges_of(&Token::Name { index: 9 }),
            Err(CellError::Name)
        );
    }

    #[test]
    fn test_memfunc_union_and_intersection() {
        let wb = wb_with_values();
        let c = ctx(&wb);

        // B2:B4,C2:C4 — union
        let union = Token::MemFunc(vec![
            Token::Area(area("B2:B4")),
            Token::Area(area("C2:C4")),
            Token::Union,
        ]);
        assert_eq!(c.cells_of(&union).unwrap().len(), 6);

        // B2:C3 B3:C4 — intersection is B3:C3
        let isect = Token::MemFunc(vec![
            Token::Area(area("B2:C3")),
            Token::Area(area("B3:C4")),
            Token::Isect,
        ]);
        let cells = c.cells_of(&isect).unwrap();
        assert_eq!(addrs(&cells), vec!["B3", "C3"]);
    }

    #[test]
    fn test_empty_intersection_is_null_error() {
        let wb = wb_with_values();
        let isect = Token::MemFunc(vec![
            Token::Area(area("B2:B3")),
            Token::Area(area("C2:C3")),
            Token::Isect,
        ]);
        assert_eq!(ctx(&wb).cells_of(&isect), Err(CellError::Null));
    }

    #[test]
    fn test_union_deduplicates_overlap() {
        let wb = wb_with_values();
        let union = Token::MemFunc(vec![
            Token::Area(area("B2:C3")),
            Token::Area(area("B3:C4")),
            Token::Union,
        ]);
        let cells = ctx(&wb).cells_of(&union).unwrap();
        assert_eq!(
            addrs(&cells),
            vec!["B2", "B3", "C2", "C3", "B4", "C4"],
            "overlapping rows appear once, in first-seen order"
        );
    }

    #[test]
    fn test_malformed_memfunc_is_error_not_partial() {
        let wb = wb_with_values();
        let dangling = Token::MemFunc(vec![Token::Area(area("B2:B4")), Token::Union]);
        assert_eq!(ctx(&wb).cells_of(&dangling), Err(CellError::Value));
    }

    #[test]
    fn test_memarea_recomputes_from_subexpression() {
        let wb = wb_with_values();
        // stale cached rectangle, but the subexpression says B2:B4
        let token = Token::MemArea {
            ranges: vec![area("A1:A1")],
            subex: vec![Token::Area(area("B2:B4"))],
        };
        let cells = ctx(&wb).cells_of(&token).unwrap();
        assert_eq!(addrs(&cells), vec!["B2", "B3", "B4"]);
    }
}
