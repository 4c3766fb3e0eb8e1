//! Text functions

use super::math::try_num;
use super::number_arg;
use crate::error::FormulaResult;
use crate::evaluator::{deref_value, to_text, EvalCtx, Value};
use wren_sheets_core::CellError;

fn text_arg(arg: &Value, ctx: &EvalCtx) -> Result<String, CellError> {
    to_text(&deref_value(arg.clone(), ctx))
}

pub(crate) fn fn_len(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let s = try_num!(text_arg(&args[0], ctx));
    Ok(Value::Number(s.chars().count() as f64))
}

pub(crate) fn fn_left(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let s = try_num!(text_arg(&args[0], ctx));
    let count = if args.len() > 1 {
        try_num!(number_arg(&args[1], ctx))
    } else {
        1.0
    };
    if count < 0.0 {
        return Ok(Value::Error(CellError::Value));
    }
    Ok(Value::Str(s.chars().take(count as usize).collect()))
}

pub(crate) fn fn_right(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let s = try_num!(text_arg(&args[0], ctx));
    let count = if args.len() > 1 {
        try_num!(number_arg(&args[1], ctx))
    } else {
        1.0
    };
    if count < 0.0 {
        return Ok(Value::Error(CellError::Value));
    }
    let chars: Vec<char> = s.chars().collect();
    let take = (count as usize).min(chars.len());
    Ok(Value::Str(chars[chars.len() - take..].iter().collect()))
}

pub(crate) fn fn_mid(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let s = try_num!(text_arg(&args[0], ctx));
    let start = try_num!(number_arg(&args[1], ctx));
    let count = try_num!(number_arg(&args[2], ctx));
    if start < 1.0 || count < 0.0 {
        return Ok(Value::Error(CellError::Value));
    }
    Ok(Value::Str(
        s.chars()
            .skip(start as usize - 1)
            .take(count as usize)
            .collect(),
    ))
}

pub(crate) fn fn_upper(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(Value::Str(try_num!(text_arg(&args[0], ctx)).to_uppercase()))
}

pub(crate) fn fn_lower(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(Value::Str(try_num!(text_arg(&args[0], ctx)).to_lowercase()))
}

/// TRIM collapses interior runs of spaces as well as stripping the ends
pub(crate) fn fn_trim(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let s = try_num!(text_arg(&args[0], ctx));
    Ok(Value::Str(
        s.split_whitespace().collect::<Vec<_>>().join(" "),
    ))
}

pub(crate) fn fn_concatenate(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let mut out = String::new();
    for arg in args {
        out.push_str(&try_num!(text_arg(arg, ctx)));
    }
    Ok(Value::Str(out))
}

pub(crate) fn fn_value(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let s = try_num!(text_arg(&args[0], ctx));
    match s.trim().parse::<f64>() {
        Ok(n) => Ok(Value::Number(n)),
        Err(_) => Ok(Value::Error(CellError::Value)),
    }
}
