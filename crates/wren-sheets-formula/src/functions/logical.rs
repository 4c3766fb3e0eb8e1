//! Logical functions

use super::math::try_num;
use crate::error::FormulaResult;
use crate::evaluator::{deref_value, to_bool, EvalCtx, Value};
use wren_sheets_core::CellError;

pub(crate) fn fn_true(_args: &[Value], _ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(Value::Bool(true))
}

pub(crate) fn fn_false(_args: &[Value], _ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(Value::Bool(false))
}

pub(crate) fn fn_if(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let cond = deref_value(args[0].clone(), ctx);
    if let Some(e) = cond.error() {
        return Ok(Value::Error(e));
    }
    let cond = try_num!(to_bool(&cond));
    if cond {
        Ok(deref_value(args[1].clone(), ctx))
    } else if args.len() > 2 {
        Ok(deref_value(args[2].clone(), ctx))
    } else {
        Ok(Value::Bool(false))
    }
}

/// Gather boolean interpretations of every argument, pulling range and
/// array components; non-boolean-non-numeric contents are skipped
fn truth_values(args: &[Value], ctx: &EvalCtx) -> Result<Vec<bool>, CellError> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Value::Ranges(ranges) => {
                for cell in ctx.resolver().expand_all(ranges)? {
                    match Value::from(cell.value) {
                        Value::Bool(b) => out.push(b),
                        Value::Number(n) => out.push(n != 0.0),
                        Value::Error(e) => return Err(e),
                        _ => {}
                    }
                }
            }
            Value::Array(rows) => {
                for v in rows.iter().flatten() {
                    match v {
                        Value::Bool(b) => out.push(*b),
                        Value::Number(n) => out.push(*n != 0.0),
                        Value::Error(e) => return Err(*e),
                        _ => {}
                    }
                }
            }
            Value::Empty => {}
            scalar => out.push(to_bool(scalar)?),
        }
    }
    Ok(out)
}

pub(crate) fn fn_and(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let values = try_num!(truth_values(args, ctx));
    if values.is_empty() {
        return Ok(Value::Error(CellError::Value));
    }
    Ok(Value::Bool(values.iter().all(|&b| b)))
}

pub(crate) fn fn_or(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let values = try_num!(truth_values(args, ctx));
    if values.is_empty() {
        return Ok(Value::Error(CellError::Value));
    }
    Ok(Value::Bool(values.iter().any(|&b| b)))
}

pub(crate) fn fn_not(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let v = deref_value(args[0].clone(), ctx);
    if let Some(e) = v.error() {
        return Ok(Value::Error(e));
    }
    Ok(Value::Bool(!try_num!(to_bool(&v))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::calculate;
    use pretty_assertions::assert_eq;
    use wren_sheets_core::{CellAddress, Workbook};

    fn calc(iftab: u16, args: &[Value]) -> Value {
        let wb = Workbook::new();
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        calculate(iftab, args, &ctx).unwrap()
    }

    #[test]
    fn test_if() {
        assert_eq!(
            calc(1, &[Value::Bool(true), Value::Number(1.0), Value::Number(2.0)]),
            Value::Number(1.0)
        );
        assert_eq!(
            calc(1, &[Value::Bool(false), Value::Number(1.0), Value::Number(2.0)]),
            Value::Number(2.0)
        );
        // missing else-branch yields FALSE
        assert_eq!(
            calc(1, &[Value::Bool(false), Value::Number(1.0)]),
            Value::Bool(false)
        );
        // error condition propagates
        assert_eq!(
            calc(
                1,
                &[Value::Error(CellError::Na), Value::Number(1.0), Value::Number(2.0)]
            ),
            Value::Error(CellError::Na)
        );
    }

    #[test]
    fn test_and_or_not() {
        assert_eq!(calc(36, &[Value::Bool(true), Value::Bool(true)]), Value::Bool(true));
        assert_eq!(calc(36, &[Value::Bool(true), Value::Bool(false)]), Value::Bool(false));
        assert_eq!(calc(37, &[Value::Bool(false), Value::Bool(true)]), Value::Bool(true));
        assert_eq!(calc(37, &[Value::Bool(false), Value::Bool(false)]), Value::Bool(false));
        assert_eq!(calc(38, &[Value::Bool(true)]), Value::Bool(false));
        // numbers coerce: 0 is false, anything else true
        assert_eq!(calc(36, &[Value::Number(1.0), Value::Number(2.0)]), Value::Bool(true));
        assert_eq!(calc(37, &[Value::Number(0.0)]), Value::Bool(false));
    }

    #[test]
    fn test_true_false() {
        assert_eq!(calc(34, &[]), Value::Bool(true));
        assert_eq!(calc(35, &[]), Value::Bool(false));
    }
}
