//! Evaluation engine
//!
//! Walks a parsed token sequence (operands and operators interleaved in
//! postfix order) with an explicit operand stack, coerces operand values to
//! the types each operation needs, and routes function calls through
//! [`crate::functions`]. Excel-style error codes travel as
//! [`Value::Error`]; they propagate first-error-wins, left-to-right, and
//! never cross the evaluation boundary as Rust errors.

use crate::biff::ATTR_SUM;
use crate::error::{FormulaError, FormulaResult};
use crate::functions;
use crate::functions::database::TableCache;
use crate::resolver::{ResolveCtx, SheetRange};
use crate::token::{ArrayValue, Token};
use std::cell::RefCell;
use wren_sheets_core::{CellAddress, CellError, CellValue, Workbook};

/// A value during evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Numeric value
    Number(f64),
    /// Text value
    Str(String),
    /// Boolean value
    Bool(bool),
    /// Spreadsheet error value
    Error(CellError),
    /// Blank (a cell with no value, or an omitted argument)
    Empty,
    /// Array of values, row-major
    Array(Vec<Vec<Value>>),
    /// One or more unresolved reference rectangles
    ///
    /// Kept lazy so consumers that need cell positions (the database
    /// functions) can pull components through the resolver, and the rest
    /// can dereference to a scalar.
    Ranges(Vec<SheetRange>),
}

impl Value {
    /// Whether this is an error value
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// The error, if this is one
    pub fn error(&self) -> Option<CellError> {
        match self {
            Value::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Convert to the stored cell representation
    ///
    /// References dereference to their single cell; a multi-cell reference
    /// or an array does not fit in a cell and becomes `#VALUE!`.
    pub fn into_cell_value(self, ctx: &EvalCtx) -> CellValue {
        match deref_value(self, ctx) {
            Value::Number(n) => CellValue::Number(n),
            Value::Str(s) => CellValue::String(s),
            Value::Bool(b) => CellValue::Boolean(b),
            Value::Error(e) => CellValue::Error(e),
            Value::Empty => CellValue::Empty,
            Value::Array(_) | Value::Ranges(_) => CellValue::Error(CellError::Value),
        }
    }
}

impl From<CellValue> for Value {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Empty => Value::Empty,
            CellValue::Number(n) => Value::Number(n),
            CellValue::String(s) => Value::Str(s),
            CellValue::Boolean(b) => Value::Bool(b),
            CellValue::Error(e) => Value::Error(e),
        }
    }
}

impl From<&ArrayValue> for Value {
    fn from(value: &ArrayValue) -> Self {
        match value {
            ArrayValue::Empty => Value::Empty,
            ArrayValue::Number(n) => Value::Number(*n),
            ArrayValue::Str(s) => Value::Str(s.clone()),
            ArrayValue::Bool(b) => Value::Bool(*b),
            ArrayValue::Err(e) => Value::Error(*e),
        }
    }
}

/// Context for one formula evaluation
pub struct EvalCtx<'a> {
    /// The workbook being evaluated against
    pub workbook: &'a Workbook,
    /// Sheet the formula lives on
    pub sheet: usize,
    /// The cell that owns the formula
    pub anchor: CellAddress,
    /// Workbook-scoped database table cache, when the caller keeps one
    pub tables: Option<&'a RefCell<TableCache>>,
}

impl<'a> EvalCtx<'a> {
    /// Create a context for a formula at the given cell
    pub fn new(workbook: &'a Workbook, sheet: usize, anchor: CellAddress) -> Self {
        Self {
            workbook,
            sheet,
            anchor,
            tables: None,
        }
    }

    /// Attach a table cache
    pub fn with_tables(mut self, tables: &'a RefCell<TableCache>) -> Self {
        self.tables = Some(tables);
        self
    }

    /// The resolver view of this context
    pub fn resolver(&self) -> ResolveCtx<'a> {
        ResolveCtx::new(self.workbook, self.sheet, self.anchor)
    }
}

/// Evaluate a postfix token sequence to a single value.
///
/// Stack underflow or leftover operands mean the stream is not a
/// well-formed expression and surface as [`FormulaError::Malformed`];
/// everything a spreadsheet user could cause stays a [`Value`].
pub fn evaluate_tokens(tokens: &[Token], ctx: &EvalCtx) -> FormulaResult<Value> {
    let mut stack: Vec<Value> = Vec::new();

    for token in tokens {
        match token {
            // === Operands ===
            Token::Int(v) => stack.push(Value::Number(f64::from(*v))),
            Token::Number(n) => stack.push(Value::Number(*n)),
            Token::Str(s) => stack.push(Value::Str(s.clone())),
            Token::Bool(b) => stack.push(Value::Bool(*b)),
            Token::Err(e) => stack.push(Value::Error(*e)),
            Token::MissingArg => stack.push(Value::Empty),
            Token::Array(array) => {
                let rows = array
                    .values()
                    .iter()
                    .map(|row| row.iter().map(Value::from).collect())
                    .collect();
                stack.push(Value::Array(rows));
            }
            Token::NameX { index, .. } => {
                // external names carry the add-in function name; dispatch
                // strips this operand after resolving the true id
                match ctx.workbook.external_name(*index) {
                    Some(name) => stack.push(Value::Str(name.to_string())),
                    None => stack.push(Value::Error(CellError::Name)),
                }
            }
            Token::Exp { .. } => {
                return Err(FormulaError::Malformed(
                    "shared-formula anchor token reached the evaluator unresolved".into(),
                ))
            }
            t if t.is_reference() => match ctx.resolver().ranges_of(t) {
                Ok(ranges) => stack.push(Value::Ranges(ranges)),
                Err(e) => stack.push(Value::Error(e)),
            },

            // === Control ===
            Token::Attr { flags, data: _ } => {
                // spaces, volatile markers, and skip targets are display or
                // streaming hints; only the optimized-SUM form evaluates
                if flags & ATTR_SUM != 0 {
                    let arg = pop1(&mut stack)?;
                    stack.push(functions::calculate(4, &[arg], ctx)?);
                }
            }

            // === Operators ===
            Token::Paren => {
                // grouping marker; the operand is already on the stack
                if stack.is_empty() {
                    return Err(FormulaError::Malformed("parenthesis with no operand".into()));
                }
            }
            Token::UPlus | Token::UMinus | Token::Percent => {
                let v = pop1(&mut stack)?;
                stack.push(unary_op(token, v, ctx));
            }
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
            | Token::Range => {
                let right = pop1(&mut stack)?;
                let left = pop1(&mut stack)?;
                stack.push(binary_op(token, left, right, ctx));
            }

            // === Function calls ===
            Token::Func { iftab } => {
                let argc = functions::fixed_argc(*iftab)?;
                let args = popn(&mut stack, argc)?;
                stack.push(functions::calculate(*iftab, &args, ctx)?);
            }
            Token::FuncVar { iftab, argc } => {
                let args = popn(&mut stack, usize::from(*argc))?;
                stack.push(functions::calculate(*iftab, &args, ctx)?);
            }

            other => {
                return Err(FormulaError::Malformed(format!(
                    "unexpected token {:?}",
                    other
                )))
            }
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(value), true) => Ok(value),
        (Some(_), false) => Err(FormulaError::Malformed(
            "expression leaves extra operands on the stack".into(),
        )),
        (None, _) => Err(FormulaError::Malformed("empty expression".into())),
    }
}

fn pop1(stack: &mut Vec<Value>) -> FormulaResult<Value> {
    stack
        .pop()
        .ok_or_else(|| FormulaError::Malformed("operand stack underflow".into()))
}

fn popn(stack: &mut Vec<Value>, n: usize) -> FormulaResult<Vec<Value>> {
    if stack.len() < n {
        return Err(FormulaError::Malformed("operand stack underflow".into()));
    }
    Ok(stack.split_off(stack.len() - n))
}

/// Dereference a reference value to the scalar it names.
///
/// A single-cell reference reads that cell; a multi-cell reference has no
/// scalar meaning and is `#VALUE!`. Other values pass through.
pub fn deref_value(value: Value, ctx: &EvalCtx) -> Value {
    match value {
        Value::Ranges(ranges) => {
            let cells = match ctx.resolver().expand_all(&ranges) {
                Ok(cells) => cells,
                Err(e) => return Value::Error(e),
            };
            match cells.len() {
                0 => Value::Empty,
                1 => cells.into_iter().next().map(|c| c.value.into()).unwrap_or(Value::Empty),
                _ => Value::Error(CellError::Value),
            }
        }
        other => other,
    }
}

/// Strict numeric coercion for a dereferenced scalar.
///
/// Order: number as-is; boolean as 1/0; text by numeric parse; a blank cell
/// coerces to 0 — but a present empty-string value does *not*, it fails
/// with `#VALUE!`. Errors pass through unchanged.
pub fn to_number(value: &Value) -> Result<f64, CellError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Bool(true) => Ok(1.0),
        Value::Bool(false) => Ok(0.0),
        Value::Str(s) => s.trim().parse().map_err(|_| CellError::Value),
        Value::Empty => Ok(0.0),
        Value::Error(e) => Err(*e),
        Value::Array(_) | Value::Ranges(_) => Err(CellError::Value),
    }
}

/// Text coercion for a dereferenced scalar
pub fn to_text(value: &Value) -> Result<String, CellError> {
    match value {
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                Ok(format!("{}", *n as i64))
            } else {
                Ok(format!("{}", n))
            }
        }
        Value::Str(s) => Ok(s.clone()),
        Value::Bool(true) => Ok("TRUE".to_string()),
        Value::Bool(false) => Ok("FALSE".to_string()),
        Value::Empty => Ok(String::new()),
        Value::Error(e) => Err(*e),
        Value::Array(_) | Value::Ranges(_) => Err(CellError::Value),
    }
}

/// Boolean coercion for a dereferenced scalar
pub fn to_bool(value: &Value) -> Result<bool, CellError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(*n != 0.0),
        Value::Str(s) => {
            if s.eq_ignore_ascii_case("TRUE") {
                Ok(true)
            } else if s.eq_ignore_ascii_case("FALSE") {
                Ok(false)
            } else {
                Err(CellError::Value)
            }
        }
        Value::Empty => Ok(false),
        Value::Error(e) => Err(*e),
        Value::Array(_) | Value::Ranges(_) => Err(CellError::Value),
    }
}

fn unary_op(op: &Token, value: Value, ctx: &EvalCtx) -> Value {
    let v = deref_value(value, ctx);
    if let Some(e) = v.error() {
        return Value::Error(e);
    }
    match op {
        // unary plus passes its operand through untouched
        Token::UPlus => v,
        Token::UMinus => match to_number(&v) {
            Ok(n) => Value::Number(-n),
            Err(e) => Value::Error(e),
        },
        Token::Percent => match to_number(&v) {
            Ok(n) => Value::Number(n / 100.0),
            Err(e) => Value::Error(e),
        },
        _ => Value::Error(CellError::Value),
    }
}

fn binary_op(op: &Token, left: Value, right: Value, ctx: &EvalCtx) -> Value {
    // reference operators combine before any dereferencing
    if matches!(op, Token::Isect | Token::Union | Token::Range) {
        return reference_op(op, left, right, ctx);
    }

    let left = deref_value(left, ctx);
    let right = deref_value(right, ctx);
    // first-error-wins, left to right
    if let Some(e) = left.error() {
        return Value::Error(e);
    }
    if let Some(e) = right.error() {
        return Value::Error(e);
    }

    match op {
        Token::Add | Token::Sub | Token::Mul | Token::Div | Token::Power => {
            let l = match to_number(&left) {
                Ok(n) => n,
                Err(e) => return Value::Error(e),
            };
            let r = match to_number(&right) {
                Ok(n) => n,
                Err(e) => return Value::Error(e),
            };
            match op {
                Token::Add => Value::Number(l + r),
                Token::Sub => Value::Number(l - r),
                Token::Mul => Value::Number(l * r),
                Token::Div => {
                    if r == 0.0 {
                        Value::Error(CellError::Div0)
                    } else {
                        Value::Number(l / r)
                    }
                }
                _ => {
                    let result = l.powf(r);
                    if result.is_nan() || result.is_infinite() {
                        Value::Error(CellError::Num)
                    } else {
                        Value::Number(result)
                    }
                }
            }
        }
        Token::Concat => match (to_text(&left), to_text(&right)) {
            (Ok(l), Ok(r)) => Value::Str(l + &r),
            (Err(e), _) | (_, Err(e)) => Value::Error(e),
        },
        Token::Lt => Value::Bool(compare_values(&left, &right) < 0),
        Token::Le => Value::Bool(compare_values(&left, &right) <= 0),
        Token::Eq => Value::Bool(compare_values(&left, &right) == 0),
        Token::Ge => Value::Bool(compare_values(&left, &right) >= 0),
        Token::Gt => Value::Bool(compare_values(&left, &right) > 0),
        Token::Ne => Value::Bool(compare_values(&left, &right) != 0),
        _ => Value::Error(CellError::Value),
    }
}

fn reference_op(op: &Token, left: Value, right: Value, ctx: &EvalCtx) -> Value {
    if let Some(e) = left.error() {
        return Value::Error(e);
    }
    if let Some(e) = right.error() {
        return Value::Error(e);
    }
    let (l, r) = match (left, right) {
        (Value::Ranges(l), Value::Ranges(r)) => (l, r),
        _ => return Value::Error(CellError::Value),
    };
    let resolver = ctx.resolver();
    let combined = match op {
        Token::Union => {
            let mut all = l;
            all.extend(r);
            Ok(all)
        }
        Token::Range => resolver.range_lists(&l, &r),
        _ => resolver.isect_lists(&l, &r),
    };
    match combined {
        Ok(ranges) => Value::Ranges(ranges),
        Err(e) => Value::Error(e),
    }
}

/// Compare two scalar values the way Excel orders them:
/// numbers < text < booleans, text case-insensitively
pub fn compare_values(left: &Value, right: &Value) -> i32 {
    let left = if matches!(left, Value::Empty) {
        &Value::Number(0.0)
    } else {
        left
    };
    let right = if matches!(right, Value::Empty) {
        &Value::Number(0.0)
    } else {
        right
    };

    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            if l < r {
                -1
            } else if l > r {
                1
            } else {
                0
            }
        }
        (Value::Str(l), Value::Str(r)) => {
            use std::cmp::Ordering;
            match l.to_lowercase().cmp(&r.to_lowercase()) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            }
        }
        (Value::Bool(l), Value::Bool(r)) => i32::from(*l) - i32::from(*r),
        (Value::Number(_), Value::Str(_)) => -1,
        (Value::Str(_), Value::Number(_)) => 1,
        (Value::Number(_), Value::Bool(_)) => -1,
        (Value::Bool(_), Value::Number(_)) => 1,
        (Value::Str(_), Value::Bool(_)) => -1,
        (Value::Bool(_), Value::Str(_)) => 1,
        (Value::Error(l), Value::Error(r)) => i32::from(l.code()) - i32::from(r.code()),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{AreaRef, CellRef};
    use pretty_assertions::assert_eq;
    use wren_sheets_core::CellRange;

    fn eval(tokens: Vec<Token>) -> FormulaResult<Value> {
        let wb = Workbook::new();
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        evaluate_tokens(&tokens, &ctx)
    }

    fn eval_in(wb: &Workbook, tokens: Vec<Token>) -> Value {
        let ctx = EvalCtx::new(wb, 0, CellAddress::new(0, 0));
        evaluate_tokens(&tokens, &ctx).unwrap()
    }

    fn num(n: f64) -> Token {
        Token::Number(n)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval(vec![num(1.0), num(2.0), Token::Add]).unwrap(), Value::Number(3.0));
        assert_eq!(eval(vec![num(10.0), num(3.0), Token::Sub]).unwrap(), Value::Number(7.0));
        assert_eq!(eval(vec![num(4.0), num(5.0), Token::Mul]).unwrap(), Value::Number(20.0));
        assert_eq!(eval(vec![num(20.0), num(4.0), Token::Div]).unwrap(), Value::Number(5.0));
        assert_eq!(
            eval(vec![num(2.0), num(10.0), Token::Power]).unwrap(),
            Value::Number(1024.0)
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            eval(vec![num(1.0), num(0.0), Token::Div]).unwrap(),
            Value::Error(CellError::Div0)
        );
    }

    #[test]
    fn test_postfix_ordering() {
        // 1+2*3 encodes as 1 2 3 * +
        assert_eq!(
            eval(vec![num(1.0), num(2.0), num(3.0), Token::Mul, Token::Add]).unwrap(),
            Value::Number(7.0)
        );
        // (1+2)*3 encodes as 1 2 + paren 3 *
        assert_eq!(
            eval(vec![
                num(1.0),
                num(2.0),
                Token::Add,
                Token::Paren,
                num(3.0),
                Token::Mul
            ])
            .unwrap(),
            Value::Number(9.0)
        );
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(eval(vec![num(5.0), Token::UMinus]).unwrap(), Value::Number(-5.0));
        assert_eq!(eval(vec![num(50.0), Token::Percent]).unwrap(), Value::Number(0.5));
        assert_eq!(
            eval(vec![Token::Str("x".into()), Token::UPlus]).unwrap(),
            Value::Str("x".into())
        );
    }

    #[test]
    fn test_concat_coerces_numbers() {
        assert_eq!(
            eval(vec![Token::Str("v=".into()), num(42.0), Token::Concat]).unwrap(),
            Value::Str("v=42".into())
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval(vec![num(1.0), num(2.0), Token::Lt]).unwrap(), Value::Bool(true));
        assert_eq!(
            eval(vec![Token::Str("ABC".into()), Token::Str("abc".into()), Token::Eq]).unwrap(),
            Value::Bool(true),
            "text comparison is case-insensitive"
        );
        assert_eq!(
            eval(vec![num(9.0), Token::Str("1".into()), Token::Lt]).unwrap(),
            Value::Bool(true),
            "numbers order before text"
        );
    }

    #[test]
    fn test_error_propagates_left_to_right() {
        // #DIV/0! + #N/A keeps the left error
        assert_eq!(
            eval(vec![
                Token::Err(CellError::Div0),
                Token::Err(CellError::Na),
                Token::Add
            ])
            .unwrap(),
            Value::Error(CellError::Div0)
        );
    }

    #[test]
    fn test_coercion_ladder() {
        // boolean as number
        assert_eq!(
            eval(vec![Token::Bool(true), num(1.0), Token::Add]).unwrap(),
            Value::Number(2.0)
        );
        // numeric text parses
        assert_eq!(
            eval(vec![Token::Str(" 4 ".into()), num(1.0), Token::Add]).unwrap(),
            Value::Number(5.0)
        );
        // unparsable text is #VALUE!
        assert_eq!(
            eval(vec![Token::Str("four".into()), num(1.0), Token::Add]).unwrap(),
            Value::Error(CellError::Value)
        );
    }

    #[test]
    fn test_blank_cell_vs_empty_string() {
        let mut wb = Workbook::new();
        wb.sheet_mut(0).unwrap().set_value("B1", "").unwrap();

        // A1 is blank: coerces to 0
        let blank = eval_in(
            &wb,
            vec![Token::Ref(CellRef::new(0, 0)), num(1.0), Token::Add],
        );
        assert_eq!(blank, Value::Number(1.0));

        // B1 holds an empty string: does not coerce
        let empty_string = eval_in(
            &wb,
            vec![Token::Ref(CellRef::new(0, 1)), num(1.0), Token::Add],
        );
        assert_eq!(empty_string, Value::Error(CellError::Value));
    }

    #[test]
    fn test_single_cell_ref_dereferences() {
        let mut wb = Workbook::new();
        wb.sheet_mut(0).unwrap().set_value("A1", 41.0).unwrap();
        let v = eval_in(&wb, vec![Token::Ref(CellRef::new(0, 0)), num(1.0), Token::Add]);
        assert_eq!(v, Value::Number(42.0));
    }

    #[test]
    fn test_multi_cell_ref_in_scalar_position_is_value_error() {
        let wb = Workbook::new();
        let a = AreaRef::from_range(CellRange::parse("A1:A3").unwrap());
        let v = eval_in(&wb, vec![Token::Area(a), num(1.0), Token::Add]);
        assert_eq!(v, Value::Error(CellError::Value));
    }

    #[test]
    fn test_union_operator_builds_range_list() {
        let wb = Workbook::new();
        let a = AreaRef::from_range(CellRange::parse("A1:A2").unwrap());
        let b = AreaRef::from_range(CellRange::parse("C1:C2").unwrap());
        let v = eval_in(&wb, vec![Token::Area(a), Token::Area(b), Token::Union]);
        match v {
            Value::Ranges(ranges) => assert_eq!(ranges.len(), 2),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_intersection_of_disjoint_is_null() {
        let wb = Workbook::new();
        let a = AreaRef::from_range(CellRange::parse("A1:A2").unwrap());
        let b = AreaRef::from_range(CellRange::parse("C1:C2").unwrap());
        let v = eval_in(&wb, vec![Token::Area(a), Token::Area(b), Token::Isect]);
        assert_eq!(v, Value::Error(CellError::Null));
    }

    #[test]
    fn test_attr_sum_applies_sum() {
        let mut wb = Workbook::new();
        let ws = wb.sheet_mut(0).unwrap();
        ws.set_value("A1", 1.0).unwrap();
        ws.set_value("A2", 2.0).unwrap();
        let a = AreaRef::from_range(CellRange::parse("A1:A2").unwrap());
        let v = eval_in(
            &wb,
            vec![
                Token::Area(a),
                Token::Attr {
                    flags: ATTR_SUM,
                    data: 0,
                },
            ],
        );
        assert_eq!(v, Value::Number(3.0));
    }

    #[test]
    fn test_malformed_streams_are_formula_errors() {
        assert!(matches!(
            eval(vec![Token::Add]),
            Err(FormulaError::Malformed(_))
        ));
        assert!(matches!(
            eval(vec![num(1.0), num(2.0)]),
            Err(FormulaError::Malformed(_))
        ));
        assert!(matches!(eval(vec![]), Err(FormulaError::Malformed(_))));
        assert!(matches!(
            eval(vec![Token::Exp { row: 0, col: 0 }]),
            Err(FormulaError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_arg_is_empty() {
        assert_eq!(
            eval(vec![Token::MissingArg, num(2.0), Token::Add]).unwrap(),
            Value::Number(2.0)
        );
    }
}
