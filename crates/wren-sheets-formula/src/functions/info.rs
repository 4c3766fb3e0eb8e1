//! Information functions
//!
//! The IS* family inspects its operand without propagating error values:
//! an error is exactly what these functions exist to observe.

use crate::error::FormulaResult;
use crate::evaluator::{deref_value, EvalCtx, Value};
use crate::resolver::ResolvedCell;
use wren_sheets_core::CellError;

pub(crate) fn fn_na(_args: &[Value], _ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(Value::Error(CellError::Na))
}

pub(crate) fn fn_isna(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let v = deref_value(args[0].clone(), ctx);
    Ok(Value::Bool(v.error() == Some(CellError::Na)))
}

pub(crate) fn fn_iserror(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let v = deref_value(args[0].clone(), ctx);
    Ok(Value::Bool(v.is_error()))
}

/// ISERR: any error except `#N/A`
pub(crate) fn fn_iserr(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let v = deref_value(args[0].clone(), ctx);
    Ok(Value::Bool(matches!(v.error(), Some(e) if e != CellError::Na)))
}

pub(crate) fn fn_isnumber(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let v = deref_value(args[0].clone(), ctx);
    Ok(Value::Bool(matches!(v, Value::Number(_))))
}

pub(crate) fn fn_istext(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let v = deref_value(args[0].clone(), ctx);
    Ok(Value::Bool(matches!(v, Value::Str(_))))
}

/// ISBLANK is true only for a cell holding nothing; an empty string is a
/// value and reads as not blank
pub(crate) fn fn_isblank(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let blank = match &args[0] {
        Value::Ranges(ranges) => match ctx.resolver().expand_all(ranges) {
            Ok(cells) => cells.iter().all(|c: &ResolvedCell| c.value.is_empty()),
            Err(e) => return Ok(Value::Error(e)),
        },
        Value::Empty => true,
        _ => false,
    };
    Ok(Value::Bool(blank))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::calculate;
    use pretty_assertions::assert_eq;
    use wren_sheets_core::{CellAddress, CellValue, Workbook};

    fn calc(iftab: u16, args: &[Value]) -> Value {
        let wb = Workbook::new();
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        calculate(iftab, args, &ctx).unwrap()
    }

    #[test]
    fn test_isna_distinguishes_error_kinds() {
        assert_eq!(calc(2, &[Value::Error(CellError::Na)]), Value::Bool(true));
        assert_eq!(calc(2, &[Value::Error(CellError::Value)]), Value::Bool(false));
        assert_eq!(calc(2, &[Value::Number(1.0)]), Value::Bool(false));
    }

    #[test]
    fn test_isna_on_cell_values() {
        let mut wb = Workbook::new();
        let ws = wb.sheet_mut(0).unwrap();
        ws.set_value_at(0, 0, CellValue::Error(CellError::Na)).unwrap();
        ws.set_value_at(1, 0, CellValue::Error(CellError::Value)).unwrap();
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let cell = |row, col| {
            let ranges = ctx
                .resolver()
                .ranges_of(&crate::token::Token::Ref(crate::token::CellRef::new(row, col)))
                .unwrap();
            Value::Ranges(ranges)
        };
        assert_eq!(calculate(2, &[cell(0, 0)], &ctx).unwrap(), Value::Bool(true));
        assert_eq!(calculate(2, &[cell(1, 0)], &ctx).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_iserror_and_iserr() {
        assert_eq!(calc(3, &[Value::Error(CellError::Div0)]), Value::Bool(true));
        assert_eq!(calc(3, &[Value::Error(CellError::Na)]), Value::Bool(true));
        assert_eq!(calc(3, &[Value::Number(0.0)]), Value::Bool(false));
        // ISERR excludes #N/A
        assert_eq!(calc(126, &[Value::Error(CellError::Na)]), Value::Bool(false));
        assert_eq!(calc(126, &[Value::Error(CellError::Ref)]), Value::Bool(true));
    }

    #[test]
    fn test_type_predicates() {
        assert_eq!(calc(128, &[Value::Number(1.0)]), Value::Bool(true));
        assert_eq!(calc(128, &[Value::Str("1".into())]), Value::Bool(false));
        assert_eq!(calc(127, &[Value::Str("x".into())]), Value::Bool(true));
        assert_eq!(calc(127, &[Value::Number(1.0)]), Value::Bool(false));
    }

    #[test]
    fn test_isblank_empty_string_is_not_blank() {
        assert_eq!(calc(129, &[Value::Empty]), Value::Bool(true));
        assert_eq!(calc(129, &[Value::Str("".into())]), Value::Bool(false));
        assert_eq!(calc(129, &[Value::Number(0.0)]), Value::Bool(false));
    }

    #[test]
    fn test_na_returns_na() {
        assert_eq!(calc(10, &[]), Value::Error(CellError::Na));
    }
}
