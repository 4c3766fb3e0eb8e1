//! Recalculation driver
//!
//! Single-threaded and synchronous: formulas evaluate in a deterministic
//! dependency order, precedents before dependents. A formula that
//! participates in a reference cycle is detected up front and reported as
//! a circular-reference error, never evaluated into unbounded recursion.

use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::{evaluate_tokens, EvalCtx};
use crate::functions::database::TableCache;
use crate::resolver::ResolveCtx;
use crate::token::Token;
use crate::tracker::{ReferenceTracker, TokenHandle};
use ahash::{AHashMap, AHashSet};
use std::cell::RefCell;
use std::rc::Rc;
use wren_sheets_core::{CellAddress, CellError, CellRange, CellValue, Workbook, MAX_COLS, MAX_ROWS};

/// Unique key for a formula cell (sheet index + coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    /// Sheet index
    pub sheet: usize,
    /// Row
    pub row: u32,
    /// Column
    pub col: u16,
}

impl CellKey {
    /// Create a new cell key
    pub fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }

    fn address(&self) -> CellAddress {
        CellAddress::new(self.row, self.col)
    }
}

/// Dependency graph for formula cells
///
/// Tracks which cells depend on which other cells, enabling ordered
/// recalculation and cycle detection.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Cell → cells that depend on it
    dependents: AHashMap<CellKey, AHashSet<CellKey>>,
    /// Cell → cells it depends on
    precedents: AHashMap<CellKey, AHashSet<CellKey>>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` depends on `precedent`
    pub fn add_dependency(&mut self, precedent: CellKey, dependent: CellKey) {
        self.dependents
            .entry(precedent)
            .or_default()
            .insert(dependent);
        self.precedents
            .entry(dependent)
            .or_default()
            .insert(precedent);
    }

    /// Remove every edge touching a cell
    pub fn clear_dependencies(&mut self, cell: CellKey) {
        if let Some(precedents) = self.precedents.remove(&cell) {
            for precedent in precedents {
                if let Some(deps) = self.dependents.get_mut(&precedent) {
                    deps.remove(&cell);
                }
            }
        }
        if let Some(dependents) = self.dependents.remove(&cell) {
            for dependent in dependents {
                if let Some(precs) = self.precedents.get_mut(&dependent) {
                    precs.remove(&cell);
                }
            }
        }
    }

    /// Cells the given cell depends on, in deterministic order
    pub fn precedents_of(&self, cell: CellKey) -> Vec<CellKey> {
        let mut out: Vec<CellKey> = self
            .precedents
            .get(&cell)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Whether the cell can reach itself through its precedent chain
    pub fn in_cycle(&self, cell: CellKey) -> bool {
        let mut stack: Vec<CellKey> = self.precedents_of(cell);
        let mut visited: AHashSet<CellKey> = AHashSet::new();
        while let Some(current) = stack.pop() {
            if current == cell {
                return true;
            }
            if visited.insert(current) {
                stack.extend(self.precedents_of(current));
            }
        }
        false
    }

    /// Clear the entire graph
    pub fn clear(&mut self) {
        self.dependents.clear();
        self.precedents.clear();
    }
}

struct FormulaCell {
    tokens: Rc<Vec<Token>>,
    handles: Vec<TokenHandle>,
}

/// The recalculation engine: formulas, their dependency graph, the
/// reference tracker, and the workbook-scoped table cache
#[derive(Default)]
pub struct Engine {
    formulas: AHashMap<CellKey, FormulaCell>,
    shared_anchors: AHashMap<CellKey, (Rc<Vec<Token>>, CellRange)>,
    graph: DependencyGraph,
    tracker: ReferenceTracker,
    tables: RefCell<TableCache>,
}

impl Engine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// The reference tracker
    pub fn tracker(&self) -> &ReferenceTracker {
        &self.tracker
    }

    /// Install a formula at a cell.
    ///
    /// A stored `[Exp]` token sequence is the member form of a shared or
    /// array formula: it is resolved to the anchor's expression, which must
    /// have been registered first via [`Engine::set_shared_formula`].
    pub fn set_formula(
        &mut self,
        workbook: &Workbook,
        sheet: usize,
        row: u32,
        col: u16,
        tokens: Vec<Token>,
    ) -> FormulaResult<()> {
        let key = CellKey::new(sheet, row, col);

        if let [Token::Exp { row: arow, col: acol }] = tokens.as_slice() {
            let anchor_key = CellKey::new(sheet, u32::from(*arow), u16::from(*acol));
            let (shared_tokens, span) =
                self.shared_anchors.get(&anchor_key).cloned().ok_or_else(|| {
                    FormulaError::InvalidReference(format!(
                        "no shared formula anchored at {}",
                        anchor_key.address()
                    ))
                })?;
            return self.install(workbook, key, shared_tokens, Some(span));
        }

        self.install(workbook, key, Rc::new(tokens), None)
    }

    /// Register a shared formula: one token sequence owned by the anchor
    /// cell, applied with per-cell offsets across the span.
    pub fn set_shared_formula(
        &mut self,
        workbook: &Workbook,
        sheet: usize,
        anchor_row: u32,
        anchor_col: u16,
        span: CellRange,
        tokens: Vec<Token>,
    ) -> FormulaResult<()> {
        let anchor_key = CellKey::new(sheet, anchor_row, anchor_col);
        let tokens = Rc::new(tokens);
        self.shared_anchors
            .insert(anchor_key, (Rc::clone(&tokens), span));
        for addr in span.cells() {
            let key = CellKey::new(sheet, addr.row, addr.col);
            self.install(workbook, key, Rc::clone(&tokens), Some(span))?;
        }
        Ok(())
    }

    /// Remove a formula and its registrations
    pub fn remove_formula(&mut self, sheet: usize, row: u32, col: u16) {
        let key = CellKey::new(sheet, row, col);
        if let Some(cell) = self.formulas.remove(&key) {
            for handle in cell.handles {
                self.tracker.unregister(handle);
            }
            self.graph.clear_dependencies(key);
        }
    }

    fn install(
        &mut self,
        workbook: &Workbook,
        key: CellKey,
        tokens: Rc<Vec<Token>>,
        shared_span: Option<CellRange>,
    ) -> FormulaResult<()> {
        self.remove_formula(key.sheet, key.row, key.col);

        let resolver = ResolveCtx::new(workbook, key.sheet, key.address());
        let mut handles = Vec::new();

        visit_reference_tokens(&tokens, &mut |token| {
            // dependency edges, one per resolved precedent cell
            if let Ok(cells) = resolver.cells_of(token) {
                for cell in cells {
                    self.graph
                        .add_dependency(CellKey::new(cell.sheet, cell.addr.row, cell.addr.col), key);
                }
            }
            // tracker registration; shared tokens cover the whole block
            if let Ok(ranges) = resolver.ranges_of(token) {
                let widen = match (&shared_span, token) {
                    (Some(span), Token::RefN(_) | Token::AreaN(_)) => Some(*span),
                    _ => None,
                };
                for range in ranges {
                    let mut registered = range.area.to_range();
                    if let Some(span) = widen {
                        registered = widen_for_shared_block(registered, span);
                    }
                    for sheet_ix in range.first_sheet..=range.last_sheet {
                        handles.push(self.tracker.register(sheet_ix, registered));
                    }
                }
            }
        });

        self.formulas.insert(key, FormulaCell { tokens, handles });
        Ok(())
    }

    /// Every registered formula cell, in deterministic order
    pub fn formula_cells(&self) -> Vec<CellKey> {
        let mut keys: Vec<CellKey> = self.formulas.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Invalidate tracker registrations and table caches after a
    /// structural edit (row/column insert or delete) on a sheet.
    ///
    /// Wholesale invalidation is the safe fallback: everything is
    /// recomputed from the range tokens on the next recalculation.
    pub fn note_structural_edit(&mut self, sheet: usize) {
        self.tracker.invalidate_sheet(sheet);
        self.tables.borrow_mut().invalidate_all();
    }

    /// Evaluate one formula cell against the workbook without storing the
    /// result
    pub fn evaluate_cell(
        &self,
        workbook: &Workbook,
        sheet: usize,
        row: u32,
        col: u16,
    ) -> FormulaResult<CellValue> {
        let key = CellKey::new(sheet, row, col);
        let cell = self.formulas.get(&key).ok_or_else(|| {
            FormulaError::InvalidReference(format!("no formula at {}", key.address()))
        })?;
        if self.graph.in_cycle(key) {
            return Err(FormulaError::CircularReference);
        }
        self.evaluate_uncached(workbook, key, cell)
    }

    fn evaluate_uncached(
        &self,
        workbook: &Workbook,
        key: CellKey,
        cell: &FormulaCell,
    ) -> FormulaResult<CellValue> {
        let ctx =
            EvalCtx::new(workbook, key.sheet, key.address()).with_tables(&self.tables);
        let value = evaluate_tokens(&cell.tokens, &ctx)?;
        Ok(value.into_cell_value(&ctx))
    }

    /// Recalculate every formula, precedents first, writing each result
    /// into its worksheet cell as it completes so dependents observe it.
    ///
    /// Returns the per-cell outcomes in evaluation order. Cells in a
    /// reference cycle report [`FormulaError::CircularReference`] and are
    /// not evaluated; an unknown function id is logged, stored as
    /// `#NAME?`, and reported as
    /// [`FormulaError::UnsupportedFunction`].
    pub fn recalculate(
        &mut self,
        workbook: &mut Workbook,
    ) -> Vec<(CellKey, FormulaResult<CellValue>)> {
        let keys = self.formula_cells();
        let mut done: AHashSet<CellKey> = AHashSet::new();
        let mut results: Vec<(CellKey, FormulaResult<CellValue>)> = Vec::new();

        // cycles first, so ordinary evaluation below never recurses into one
        let cyclic: AHashSet<CellKey> = keys
            .iter()
            .copied()
            .filter(|&k| self.graph.in_cycle(k))
            .collect();
        for &key in keys.iter().filter(|k| cyclic.contains(*k)) {
            results.push((key, Err(FormulaError::CircularReference)));
            done.insert(key);
        }

        for key in keys {
            self.eval_in_order(workbook, key, &cyclic, &mut done, &mut results);
        }
        results
    }

    fn eval_in_order(
        &self,
        workbook: &mut Workbook,
        key: CellKey,
        cyclic: &AHashSet<CellKey>,
        done: &mut AHashSet<CellKey>,
        results: &mut Vec<(CellKey, FormulaResult<CellValue>)>,
    ) {
        if done.contains(&key) {
            return;
        }
        done.insert(key);

        for precedent in self.graph.precedents_of(key) {
            if self.formulas.contains_key(&precedent) && !cyclic.contains(&precedent) {
                self.eval_in_order(workbook, precedent, cyclic, done, results);
            }
        }

        let cell = match self.formulas.get(&key) {
            Some(cell) => cell,
            None => return,
        };
        let outcome = self.evaluate_uncached(workbook, key, cell);
        let stored = match &outcome {
            Ok(value) => Some(value.clone()),
            Err(FormulaError::UnsupportedFunction { iftab, name }) => {
                log::warn!(
                    "function id {} ({}) not supported; storing #NAME? at {}",
                    iftab,
                    name,
                    key.address()
                );
                Some(CellValue::Error(CellError::Name))
            }
            Err(_) => None,
        };
        if let Some(value) = stored {
            if let Some(sheet) = workbook.sheet_mut(key.sheet) {
                let _ = sheet.set_value_at(key.row, key.col, value);
            }
        }
        results.push((key, outcome));
    }
}

/// Visit every reference-shaped token, including those inside MemFunc and
/// MemArea sub-expressions
fn visit_reference_tokens(tokens: &[Token], visit: &mut impl FnMut(&Token)) {
    for token in tokens {
        if token.is_reference() {
            visit(token);
        }
        match token {
            Token::MemFunc(subex) | Token::MemArea { subex, .. } => {
                visit_reference_tokens(subex, visit);
            }
            _ => {}
        }
    }
}

/// Widen a shared-formula token's registration to cover every cell in the
/// shared block: the token's own effective range at the anchor plus the
/// block's extent.
fn widen_for_shared_block(range: CellRange, span: CellRange) -> CellRange {
    let extra_rows = span.end.row - span.start.row;
    let extra_cols = span.end.col - span.start.col;
    let end = CellAddress::new(
        (range.end.row + extra_rows).min(MAX_ROWS - 1),
        (range.end.col + extra_cols).min(MAX_COLS - 1),
    );
    CellRange::new(range.start, end)
}
