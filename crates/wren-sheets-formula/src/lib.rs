//! # wren-sheets-formula
//!
//! The formula subsystem of wren-sheets: decodes the BIFF8 binary token
//! stream Excel uses to store a cell formula, resolves the cell and range
//! references those tokens describe (cross-sheet and shared-formula
//! relative addressing included), and evaluates the resulting expression
//! against worksheet data.
//!
//! Pipeline: bytes → [`Token`]s (via [`biff`]) → resolved cells (via
//! [`resolver`]) → a result [`Value`] (via [`evaluator`] and
//! [`functions`]). The [`recalc::Engine`] drives whole-workbook
//! recalculation in dependency order, with cycle detection.
//!
//! ## Example
//!
//! ```rust
//! use wren_sheets_core::{CellAddress, Workbook};
//! use wren_sheets_formula::biff::decode_tokens;
//! use wren_sheets_formula::evaluator::{evaluate_tokens, EvalCtx, Value};
//!
//! // =3+4 as a stored token stream
//! let rgce = [0x1E, 3, 0, 0x1E, 4, 0, 0x03];
//! let tokens = decode_tokens(&rgce, &[]).unwrap();
//!
//! let wb = Workbook::new();
//! let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
//! assert_eq!(evaluate_tokens(&tokens, &ctx).unwrap(), Value::Number(7.0));
//! ```

pub mod biff;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod memfunc;
pub mod recalc;
pub mod resolver;
pub mod token;
pub mod tracker;

pub use biff::{decode_tokens, encode_tokens, DecodeError, EncodedFormula};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{evaluate_tokens, EvalCtx, Value};
pub use memfunc::RefExpr;
pub use recalc::{CellKey, DependencyGraph, Engine};
pub use resolver::{ResolveCtx, ResolvedCell, SheetRange};
pub use token::{ArrayLiteral, ArrayValue, AreaRef, CellRef, Token};
pub use tracker::{ReferenceTracker, TokenHandle};
