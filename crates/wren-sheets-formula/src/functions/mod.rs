//! Built-in function dispatch
//!
//! BIFF formulas call functions by numeric id (`iftab`). The registry maps
//! each implemented id to its definition; [`calculate`] routes a call,
//! resolving add-in calls (id 255) by name first. An id with no mapped
//! implementation raises [`FormulaError::UnsupportedFunction`] — a
//! condition distinct from the spreadsheet error values, so the host can
//! log it and decide how to surface it.

pub mod criteria;
pub mod database;
pub mod info;
pub mod logical;
pub mod math;
pub mod text;

use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::{deref_value, to_number, EvalCtx, Value};
use ahash::AHashMap;
use once_cell::sync::Lazy;
use wren_sheets_core::CellError;

/// The id BIFF stores for add-in / future functions; the true function is
/// named by the call's first operand
pub const IFTAB_ADDIN: u16 = 255;

/// Function implementation signature
pub type FnImpl = fn(&[Value], &EvalCtx) -> FormulaResult<Value>;

/// A registered builtin
pub struct FunctionDef {
    /// BIFF function id
    pub iftab: u16,
    /// Canonical (uppercase) name
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub imp: FnImpl,
}

/// All implemented builtins, in id order
static DEFS: &[FunctionDef] = &[
    FunctionDef { iftab: 0, name: "COUNT", min_args: 1, max_args: None, imp: math::fn_count },
    FunctionDef { iftab: 1, name: "IF", min_args: 2, max_args: Some(3), imp: logical::fn_if },
    FunctionDef { iftab: 2, name: "ISNA", min_args: 1, max_args: Some(1), imp: info::fn_isna },
    FunctionDef { iftab: 3, name: "ISERROR", min_args: 1, max_args: Some(1), imp: info::fn_iserror },
    FunctionDef { iftab: 4, name: "SUM", min_args: 1, max_args: None, imp: math::fn_sum },
    FunctionDef { iftab: 5, name: "AVERAGE", min_args: 1, max_args: None, imp: math::fn_average },
    FunctionDef { iftab: 6, name: "MIN", min_args: 1, max_args: None, imp: math::fn_min },
    FunctionDef { iftab: 7, name: "MAX", min_args: 1, max_args: None, imp: math::fn_max },
    FunctionDef { iftab: 10, name: "NA", min_args: 0, max_args: Some(0), imp: info::fn_na },
    FunctionDef { iftab: 15, name: "SIN", min_args: 1, max_args: Some(1), imp: math::fn_sin },
    FunctionDef { iftab: 16, name: "COS", min_args: 1, max_args: Some(1), imp: math::fn_cos },
    FunctionDef { iftab: 17, name: "TAN", min_args: 1, max_args: Some(1), imp: math::fn_tan },
    FunctionDef { iftab: 18, name: "ATAN", min_args: 1, max_args: Some(1), imp: math::fn_atan },
    FunctionDef { iftab: 19, name: "PI", min_args: 0, max_args: Some(0), imp: math::fn_pi },
    FunctionDef { iftab: 20, name: "SQRT", min_args: 1, max_args: Some(1), imp: math::fn_sqrt },
    FunctionDef { iftab: 21, name: "EXP", min_args: 1, max_args: Some(1), imp: math::fn_exp },
    FunctionDef { iftab: 22, name: "LN", min_args: 1, max_args: Some(1), imp: math::fn_ln },
    FunctionDef { iftab: 23, name: "LOG10", min_args: 1, max_args: Some(1), imp: math::fn_log10 },
    FunctionDef { iftab: 24, name: "ABS", min_args: 1, max_args: Some(1), imp: math::fn_abs },
    FunctionDef { iftab: 25, name: "INT", min_args: 1, max_args: Some(1), imp: math::fn_int },
    FunctionDef { iftab: 26, name: "SIGN", min_args: 1, max_args: Some(1), imp: math::fn_sign },
    FunctionDef { iftab: 27, name: "ROUND", min_args: 1, max_args: Some(2), imp: math::fn_round },
    FunctionDef { iftab: 31, name: "MID", min_args: 3, max_args: Some(3), imp: text::fn_mid },
    FunctionDef { iftab: 32, name: "LEN", min_args: 1, max_args: Some(1), imp: text::fn_len },
    FunctionDef { iftab: 33, name: "VALUE", min_args: 1, max_args: Some(1), imp: text::fn_value },
    FunctionDef { iftab: 34, name: "TRUE", min_args: 0, max_args: Some(0), imp: logical::fn_true },
    FunctionDef { iftab: 35, name: "FALSE", min_args: 0, max_args: Some(0), imp: logical::fn_false },
    FunctionDef { iftab: 36, name: "AND", min_args: 1, max_args: None, imp: logical::fn_and },
    FunctionDef { iftab: 37, name: "OR", min_args: 1, max_args: None, imp: logical::fn_or },
    FunctionDef { iftab: 38, name: "NOT", min_args: 1, max_args: Some(1), imp: logical::fn_not },
    FunctionDef { iftab: 39, name: "MOD", min_args: 2, max_args: Some(2), imp: math::fn_mod },
    FunctionDef { iftab: 40, name: "DCOUNT", min_args: 3, max_args: Some(3), imp: database::fn_dcount },
    FunctionDef { iftab: 41, name: "DSUM", min_args: 3, max_args: Some(3), imp: database::fn_dsum },
    FunctionDef { iftab: 42, name: "DAVERAGE", min_args: 3, max_args: Some(3), imp: database::fn_daverage },
    FunctionDef { iftab: 43, name: "DMIN", min_args: 3, max_args: Some(3), imp: database::fn_dmin },
    FunctionDef { iftab: 44, name: "DMAX", min_args: 3, max_args: Some(3), imp: database::fn_dmax },
    FunctionDef { iftab: 45, name: "DSTDEV", min_args: 3, max_args: Some(3), imp: database::fn_dstdev },
    FunctionDef { iftab: 47, name: "DVAR", min_args: 3, max_args: Some(3), imp: database::fn_dvar },
    FunctionDef { iftab: 97, name: "ATAN2", min_args: 2, max_args: Some(2), imp: math::fn_atan2 },
    FunctionDef { iftab: 109, name: "LOG", min_args: 1, max_args: Some(2), imp: math::fn_log },
    FunctionDef { iftab: 112, name: "LOWER", min_args: 1, max_args: Some(1), imp: text::fn_lower },
    FunctionDef { iftab: 113, name: "UPPER", min_args: 1, max_args: Some(1), imp: text::fn_upper },
    FunctionDef { iftab: 115, name: "LEFT", min_args: 1, max_args: Some(2), imp: text::fn_left },
    FunctionDef { iftab: 116, name: "RIGHT", min_args: 1, max_args: Some(2), imp: text::fn_right },
    FunctionDef { iftab: 118, name: "TRIM", min_args: 1, max_args: Some(1), imp: text::fn_trim },
    FunctionDef { iftab: 126, name: "ISERR", min_args: 1, max_args: Some(1), imp: info::fn_iserr },
    FunctionDef { iftab: 127, name: "ISTEXT", min_args: 1, max_args: Some(1), imp: info::fn_istext },
    FunctionDef { iftab: 128, name: "ISNUMBER", min_args: 1, max_args: Some(1), imp: info::fn_isnumber },
    FunctionDef { iftab: 129, name: "ISBLANK", min_args: 1, max_args: Some(1), imp: info::fn_isblank },
    FunctionDef { iftab: 169, name: "COUNTA", min_args: 1, max_args: None, imp: math::fn_counta },
    FunctionDef { iftab: 183, name: "PRODUCT", min_args: 1, max_args: None, imp: math::fn_product },
    FunctionDef { iftab: 189, name: "DPRODUCT", min_args: 3, max_args: Some(3), imp: database::fn_dproduct },
    FunctionDef { iftab: 195, name: "DSTDEVP", min_args: 3, max_args: Some(3), imp: database::fn_dstdevp },
    FunctionDef { iftab: 196, name: "DVARP", min_args: 3, max_args: Some(3), imp: database::fn_dvarp },
    FunctionDef { iftab: 197, name: "TRUNC", min_args: 1, max_args: Some(2), imp: math::fn_trunc },
    FunctionDef { iftab: 199, name: "DCOUNTA", min_args: 3, max_args: Some(3), imp: database::fn_dcounta },
    FunctionDef { iftab: 212, name: "ROUNDUP", min_args: 2, max_args: Some(2), imp: math::fn_roundup },
    FunctionDef { iftab: 213, name: "ROUNDDOWN", min_args: 2, max_args: Some(2), imp: math::fn_rounddown },
    FunctionDef { iftab: 227, name: "MEDIAN", min_args: 1, max_args: None, imp: math::fn_median },
    FunctionDef { iftab: 228, name: "SUMPRODUCT", min_args: 1, max_args: None, imp: math::fn_sumproduct },
    FunctionDef { iftab: 235, name: "DGET", min_args: 3, max_args: Some(3), imp: database::fn_dget },
    FunctionDef { iftab: 279, name: "EVEN", min_args: 1, max_args: Some(1), imp: math::fn_even },
    FunctionDef { iftab: 285, name: "FLOOR", min_args: 2, max_args: Some(2), imp: math::fn_floor },
    FunctionDef { iftab: 288, name: "CEILING", min_args: 2, max_args: Some(2), imp: math::fn_ceiling },
    FunctionDef { iftab: 298, name: "ODD", min_args: 1, max_args: Some(1), imp: math::fn_odd },
    FunctionDef { iftab: 336, name: "CONCATENATE", min_args: 1, max_args: None, imp: text::fn_concatenate },
    FunctionDef { iftab: 337, name: "POWER", min_args: 2, max_args: Some(2), imp: math::fn_power },
    FunctionDef { iftab: 342, name: "RADIANS", min_args: 1, max_args: Some(1), imp: math::fn_radians },
    FunctionDef { iftab: 343, name: "DEGREES", min_args: 1, max_args: Some(1), imp: math::fn_degrees },
    FunctionDef { iftab: 345, name: "SUMIF", min_args: 2, max_args: Some(3), imp: criteria::fn_sumif },
    FunctionDef { iftab: 346, name: "COUNTIF", min_args: 2, max_args: Some(2), imp: criteria::fn_countif },
];

struct Registry {
    by_id: AHashMap<u16, &'static FunctionDef>,
    by_name: AHashMap<&'static str, u16>,
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut by_id = AHashMap::with_capacity(DEFS.len());
    let mut by_name = AHashMap::with_capacity(DEFS.len());
    for def in DEFS {
        by_id.insert(def.iftab, def);
        by_name.insert(def.name, def.iftab);
    }
    Registry { by_id, by_name }
});

/// Look up a function definition by id
pub fn lookup(iftab: u16) -> Option<&'static FunctionDef> {
    REGISTRY.by_id.get(&iftab).copied()
}

/// Resolve a function name (case-insensitive, tolerating the `_xlfn.`
/// forward-compatibility prefix) to its id
pub fn id_for_name(name: &str) -> Option<u16> {
    let name = name.strip_prefix("_xlfn.").unwrap_or(name);
    let upper = name.to_ascii_uppercase();
    REGISTRY.by_name.get(upper.as_str()).copied()
}

/// Operand count a fixed-arity call pops for this id
pub fn fixed_argc(iftab: u16) -> FormulaResult<usize> {
    let def = lookup(iftab).ok_or(FormulaError::UnsupportedFunction {
        iftab,
        name: "unknown".to_string(),
    })?;
    Ok(def.min_args)
}

/// Calculate a function call.
///
/// For an add-in call (id 255) the first operand is the name reference;
/// the true id is resolved by name lookup and the call re-dispatched with
/// that operand stripped. An unresolvable add-in name is `#NAME?`.
pub fn calculate(iftab: u16, args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    if iftab == IFTAB_ADDIN {
        let name = match args.first() {
            Some(Value::Str(name)) => name.clone(),
            Some(Value::Error(e)) => return Ok(Value::Error(*e)),
            _ => return Ok(Value::Error(CellError::Name)),
        };
        return match id_for_name(&name) {
            Some(id) => calculate(id, &args[1..], ctx),
            None => {
                log::warn!("unresolved add-in function '{}'", name);
                Ok(Value::Error(CellError::Name))
            }
        };
    }

    let def = lookup(iftab).ok_or(FormulaError::UnsupportedFunction {
        iftab,
        name: "unknown".to_string(),
    })?;

    if args.len() < def.min_args || def.max_args.map(|m| args.len() > m).unwrap_or(false) {
        return Ok(Value::Error(CellError::Na));
    }

    (def.imp)(args, ctx)
}

// ── Coercion helpers shared by the function bodies ──────────────────────

/// Collect the numeric contents of a mixed argument list.
///
/// Reference and array operands contribute their numeric elements only
/// (text and booleans inside a range are ignored, matching worksheet
/// aggregation); a direct scalar argument is strictly coerced. The first
/// error anywhere short-circuits the whole collection.
pub(crate) fn collect_numbers(args: &[Value], ctx: &EvalCtx) -> Result<Vec<f64>, CellError> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Value::Ranges(ranges) => {
                for cell in ctx.resolver().expand_all(ranges)? {
                    match Value::from(cell.value) {
                        Value::Number(n) => out.push(n),
                        Value::Error(e) => return Err(e),
                        _ => {}
                    }
                }
            }
            Value::Array(rows) => {
                for v in rows.iter().flatten() {
                    match v {
                        Value::Number(n) => out.push(*n),
                        Value::Error(e) => return Err(*e),
                        _ => {}
                    }
                }
            }
            Value::Empty => {}
            scalar => out.push(to_number(scalar)?),
        }
    }
    Ok(out)
}

/// Strictly coerce one argument to a number, dereferencing a single-cell
/// reference first
pub(crate) fn number_arg(arg: &Value, ctx: &EvalCtx) -> Result<f64, CellError> {
    to_number(&deref_value(arg.clone(), ctx))
}

/// Materialize one argument as a row-major grid of scalar values.
///
/// A reference argument must be a single rectangle; a scalar becomes a
/// 1×1 grid.
pub(crate) fn value_grid(arg: &Value, ctx: &EvalCtx) -> Result<Vec<Vec<Value>>, CellError> {
    match arg {
        Value::Array(rows) => Ok(rows.clone()),
        Value::Ranges(ranges) => {
            if ranges.len() != 1 {
                return Err(CellError::Value);
            }
            let cells = ctx.resolver().expand_all(ranges)?;
            if cells.is_empty() {
                return Ok(vec![vec![Value::Empty]]);
            }
            let min_row = cells.iter().map(|c| c.addr.row).min().unwrap_or(0);
            let max_row = cells.iter().map(|c| c.addr.row).max().unwrap_or(0);
            let min_col = cells.iter().map(|c| c.addr.col).min().unwrap_or(0);
            let max_col = cells.iter().map(|c| c.addr.col).max().unwrap_or(0);
            let width = (max_col - min_col + 1) as usize;
            let height = (max_row - min_row + 1) as usize;
            let mut grid = vec![vec![Value::Empty; width]; height];
            for cell in cells {
                let r = (cell.addr.row - min_row) as usize;
                let c = (cell.addr.col - min_col) as usize;
                grid[r][c] = cell.value.into();
            }
            Ok(grid)
        }
        scalar => Ok(vec![vec![scalar.clone()]]),
    }
}
