//! Formula token model
//!
//! A parsed BIFF8 formula is a postfix sequence of tokens: operands push
//! onto the evaluation stack, operators and function calls pop their
//! arguments. [`Token`] is a closed enum with one variant per token kind;
//! the binary layouts live in [`crate::biff`] as pure functions per variant.
//!
//! A token's kind never changes after construction. Only its *location*
//! (row/column, sheet index) may be rewritten, when the owning cell moves or
//! a referenced range is relocated. A relocation that would push a reference
//! off the sheet reports `#REF!` to the caller, which replaces the token
//! with the matching error variant rather than mutating the kind in place.

use wren_sheets_core::{CellAddress, CellError, CellRange, MAX_COLS, MAX_ROWS};

/// A single cell reference as stored in a token
///
/// `row`/`col` are either absolute coordinates or, in the shared-formula
/// variants (`RefN`/`AreaN`), offsets from the anchor cell. The relative
/// flags are independent per axis; asymmetric combinations (`$A1`, `A$1`)
/// are legal and survive encoding. `whole_row`/`whole_col` mark spans that
/// cover an entire row or column and resolve against the sheet's current
/// bounds, not a stored coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    /// Row (0-based), or signed row offset in shared-formula form
    pub row: u16,
    /// Column ordinal (0-based, 14 bits), or signed column offset
    pub col: u16,
    /// Row is relative (bit 15 of the packed column field)
    pub row_rel: bool,
    /// Column is relative (bit 14 of the packed column field)
    pub col_rel: bool,
    /// Reference spans the entire row ("$1:$1" style)
    pub whole_row: bool,
    /// Reference spans the entire column ("$A:$A" style)
    pub whole_col: bool,
}

impl CellRef {
    /// A fully-relative reference to the given coordinates
    pub fn new(row: u16, col: u16) -> Self {
        Self {
            row,
            col,
            row_rel: true,
            col_rel: true,
            whole_row: false,
            whole_col: false,
        }
    }

    /// A fully-absolute reference
    pub fn absolute(row: u16, col: u16) -> Self {
        Self {
            row,
            col,
            row_rel: false,
            col_rel: false,
            whole_row: false,
            whole_col: false,
        }
    }

    /// Construct from an A1-style address, keeping the `$` flags
    ///
    /// The stored flags are *relative* flags, the inverse of the address's
    /// absolute markers.
    pub fn from_address(addr: CellAddress) -> Self {
        Self {
            row: addr.row as u16,
            col: addr.col,
            row_rel: !addr.row_absolute,
            col_rel: !addr.col_absolute,
            whole_row: false,
            whole_col: false,
        }
    }

    /// Convert to a core address, keeping the `$` flags
    pub fn to_address(&self) -> CellAddress {
        CellAddress::with_absolute(self.row as u32, self.col, !self.row_rel, !self.col_rel)
    }

    /// Rewrite the location in place, preserving the relative flags
    pub fn set_location(&mut self, row: u16, col: u16) {
        self.row = row;
        self.col = col;
        self.whole_row = false;
        self.whole_col = false;
    }

    /// Shift the row by `delta` if this reference sits at or below
    /// `start`. Reports `#REF!` when the shift would leave the sheet.
    pub fn shift_rows(&mut self, start: u16, delta: i32) -> Result<(), CellError> {
        if self.whole_col || u32::from(self.row) < u32::from(start) {
            return Ok(());
        }
        let shifted = i64::from(self.row) + i64::from(delta);
        if shifted < 0 || shifted >= i64::from(MAX_ROWS) {
            return Err(CellError::Ref);
        }
        self.row = shifted as u16;
        Ok(())
    }

    /// Shift the column by `delta` if this reference sits at or right of
    /// `start`. Reports `#REF!` when the shift would leave the sheet.
    pub fn shift_cols(&mut self, start: u16, delta: i32) -> Result<(), CellError> {
        if self.whole_row || self.col < start {
            return Ok(());
        }
        let shifted = i64::from(self.col) + i64::from(delta);
        if shifted < 0 || shifted >= i64::from(MAX_COLS) {
            return Err(CellError::Ref);
        }
        self.col = shifted as u16;
        Ok(())
    }

    /// Display in A1 form, honoring the `$` flags
    pub fn to_a1_string(&self) -> String {
        if self.whole_col {
            let c = CellAddress::column_to_letters(self.col);
            return format!("{}{}", if self.col_rel { "" } else { "$" }, c);
        }
        if self.whole_row {
            return format!("{}{}", if self.row_rel { "" } else { "$" }, self.row + 1);
        }
        self.to_address().to_a1_string()
    }
}

/// A rectangular range: a pair of corner references
///
/// Corners may be stored with first > last on either axis; normalization
/// happens at resolution time, not here, so the stored form round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaRef {
    /// First corner as stored
    pub first: CellRef,
    /// Last corner as stored
    pub last: CellRef,
}

impl AreaRef {
    /// Create from two corners
    pub fn new(first: CellRef, last: CellRef) -> Self {
        Self { first, last }
    }

    /// Create from a normalized core range, keeping per-corner `$` flags
    pub fn from_range(range: CellRange) -> Self {
        Self {
            first: CellRef::from_address(range.start),
            last: CellRef::from_address(range.end),
        }
    }

    /// The normalized core range this area covers (no bounds substitution)
    pub fn to_range(&self) -> CellRange {
        CellRange::new(self.first.to_address(), self.last.to_address())
    }

    /// Whether both corners name the same cell
    pub fn is_single_cell(&self) -> bool {
        self.first.row == self.last.row && self.first.col == self.last.col
    }

    /// Display in A1 form
    pub fn to_a1_string(&self) -> String {
        format!("{}:{}", self.first.to_a1_string(), self.last.to_a1_string())
    }
}

/// One element of an array constant
///
/// `Empty` is a hole in the literal and is distinct from a numeric zero.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    /// Empty element
    Empty,
    /// IEEE double
    Number(f64),
    /// Text
    Str(String),
    /// Boolean
    Bool(bool),
    /// Error code
    Err(CellError),
}

/// An array constant: a rectangular literal of typed scalar values
///
/// The stored shape is authoritative; the codec re-derives the
/// `columns-1`/`rows-1` header from it on encode rather than trusting a
/// cached header.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayLiteral {
    rows: Vec<Vec<ArrayValue>>,
}

impl ArrayLiteral {
    /// Build from row-major values. All rows must have the same width and
    /// the literal must be non-empty.
    pub fn new(rows: Vec<Vec<ArrayValue>>) -> Option<Self> {
        let width = rows.first()?.len();
        if width == 0 || rows.iter().any(|r| r.len() != width) {
            return None;
        }
        Some(Self { rows })
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.rows[0].len()
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Row-major element access
    pub fn get(&self, row: usize, col: usize) -> Option<&ArrayValue> {
        self.rows.get(row)?.get(col)
    }

    /// The row-major element grid
    pub fn values(&self) -> &[Vec<ArrayValue>] {
        &self.rows
    }
}

/// A formula token
///
/// The variants mirror BIFF8's Ptg set. Operand-class distinctions
/// (REF/VALUE/ARRAY encodings of the same logical token) are erased on
/// decode; the codec normalizes them back to one class on encode.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Operands ===
    /// Small integer literal
    Int(u16),
    /// Number literal
    Number(f64),
    /// String literal
    Str(String),
    /// Boolean literal
    Bool(bool),
    /// Error literal
    Err(CellError),
    /// Omitted argument placeholder
    MissingArg,
    /// Single-cell reference on the formula's own sheet
    Ref(CellRef),
    /// Rectangular range on the formula's own sheet
    Area(AreaRef),
    /// Single-cell reference through the external-sheet table
    Ref3d {
        /// Signed index into the external-sheet table
        ixti: i16,
        /// The cell
        cell: CellRef,
    },
    /// Rectangular range through the external-sheet table; a 3-D range when
    /// the span covers more than one sheet
    Area3d {
        /// Signed index into the external-sheet table
        ixti: i16,
        /// The range
        area: AreaRef,
    },
    /// Deleted single-cell reference (always evaluates to `#REF!`)
    RefErr,
    /// Deleted range reference
    AreaErr,
    /// Deleted 3-D single-cell reference
    RefErr3d {
        /// Signed index into the external-sheet table
        ixti: i16,
    },
    /// Deleted 3-D range reference
    AreaErr3d {
        /// Signed index into the external-sheet table
        ixti: i16,
    },
    /// Shared-formula cell reference: row/col are offsets from the anchor
    RefN(CellRef),
    /// Shared-formula range reference: corners are offsets from the anchor
    AreaN(AreaRef),
    /// Array constant
    Array(ArrayLiteral),
    /// Defined-name reference (1-based index into the workbook name table)
    Name {
        /// Name table index
        index: u16,
    },
    /// External name reference (add-in functions, cross-book names)
    NameX {
        /// Signed index into the external-sheet table
        ixti: i16,
        /// External name table index (1-based)
        index: u16,
    },
    /// Non-constant reference expression: a postfix sub-expression over
    /// union/intersection/range operators that must be evaluated to produce
    /// its final set of ranges
    MemFunc(Vec<Token>),
    /// Pre-computed reference expression: carries both the cached rectangle
    /// list and the sub-expression it was computed from
    MemArea {
        /// Cached rectangles (recomputed from `subex` when stale)
        ranges: Vec<AreaRef>,
        /// The defining sub-expression
        subex: Vec<Token>,
    },
    /// Shared-formula/array anchor pointer: names the cell holding the
    /// actual expression
    Exp {
        /// Anchor row
        row: u16,
        /// Anchor column
        col: u16,
    },

    // === Binary operators ===
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Power,
    /// `&`
    Concat,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `=`
    Eq,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `<>`
    Ne,
    /// Reference intersection (space)
    Isect,
    /// Reference union (`,`)
    Union,
    /// Range constructor (`:`)
    Range,

    // === Unary operators ===
    /// Unary plus
    UPlus,
    /// Unary minus
    UMinus,
    /// Percent (divide by 100)
    Percent,
    /// Parenthesized sub-expression marker
    Paren,

    // === Control ===
    /// tAttr: display/optimization hints (spaces, optimized SUM, volatile)
    Attr {
        /// Flag byte
        flags: u8,
        /// Flag-specific data word
        data: u16,
    },

    // === Function calls ===
    /// Fixed-arity builtin call
    Func {
        /// BIFF function id
        iftab: u16,
    },
    /// Variable-arity builtin or add-in call
    FuncVar {
        /// BIFF function id (255 = add-in; the first operand names it)
        iftab: u16,
        /// Operand count (top bit masked off by the codec)
        argc: u8,
    },
}

impl Token {
    /// Whether this token pushes a value onto the evaluation stack
    pub fn is_operand(&self) -> bool {
        matches!(
            self,
            Token::Int(_)
                | Token::Number(_)
                | Token::Str(_)
                | Token::Bool(_)
                | Token::Err(_)
                | Token::MissingArg
                | Token::Ref(_)
                | Token::Area(_)
                | Token::Ref3d { .. }
                | Token::Area3d { .. }
                | Token::RefErr
                | Token::AreaErr
                | Token::RefErr3d { .. }
                | Token::AreaErr3d { .. }
                | Token::RefN(_)
                | Token::AreaN(_)
                | Token::Array(_)
                | Token::Name { .. }
                | Token::NameX { .. }
                | Token::MemFunc(_)
                | Token::MemArea { .. }
                | Token::Exp { .. }
        )
    }

    /// Whether this token is any reference-shaped operand
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Token::Ref(_)
                | Token::Area(_)
                | Token::Ref3d { .. }
                | Token::Area3d { .. }
                | Token::RefErr
                | Token::AreaErr
                | Token::RefErr3d { .. }
                | Token::AreaErr3d { .. }
                | Token::RefN(_)
                | Token::AreaN(_)
                | Token::Name { .. }
                | Token::MemFunc(_)
                | Token::MemArea { .. }
        )
    }

    /// Number of operands a binary operator pops (0 for non-operators)
    pub fn operator_arity(&self) -> usize {
        match self {
            Token::Add
            | Token::Sub
            | Token::Mul
            | Token::Div
            | Token::Power
            | Token::Concat
            | Token::Lt
            | Token::Le
            | Token::Eq
            | Token::Ge
            | Token::Gt
            | Token::Ne
            | Token::Isect
            | Token::Union
            | Token::Range => 2,
            Token::UPlus | Token::UMinus | Token::Percent | Token::Paren => 1,
            _ => 0,
        }
    }

    /// Whether this is a function-call token
    pub fn is_function(&self) -> bool {
        matches!(self, Token::Func { .. } | Token::FuncVar { .. })
    }

    /// Shift row references at/below `start` by `delta` rows
    ///
    /// On overflow the token is *not* mutated; the caller receives `#REF!`
    /// and swaps in the matching error variant, so the kind invariant holds.
    pub fn shift_rows(&mut self, start: u16, delta: i32) -> Result<(), CellError> {
        match self {
            Token::Ref(r) | Token::RefN(r) => r.shift_rows(start, delta),
            Token::Ref3d { cell, .. } => cell.shift_rows(start, delta),
            Token::Area(a) | Token::AreaN(a) => {
                let mut probe = *a;
                probe.first.shift_rows(start, delta)?;
                probe.last.shift_rows(start, delta)?;
                *a = probe;
                Ok(())
            }
            Token::Area3d { area, .. } => {
                let mut probe = *area;
                probe.first.shift_rows(start, delta)?;
                probe.last.shift_rows(start, delta)?;
                *area = probe;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Shift column references at/right-of `start` by `delta` columns
    pub fn shift_cols(&mut self, start: u16, delta: i32) -> Result<(), CellError> {
        match self {
            Token::Ref(r) | Token::RefN(r) => r.shift_cols(start, delta),
            Token::Ref3d { cell, .. } => cell.shift_cols(start, delta),
            Token::Area(a) | Token::AreaN(a) => {
                let mut probe = *a;
                probe.first.shift_cols(start, delta)?;
                probe.last.shift_cols(start, delta)?;
                *a = probe;
                Ok(())
            }
            Token::Area3d { area, .. } => {
                let mut probe = *area;
                probe.first.shift_cols(start, delta)?;
                probe.last.shift_cols(start, delta)?;
                *area = probe;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
