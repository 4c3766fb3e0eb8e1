//! Math and aggregation functions

use super::{collect_numbers, number_arg, value_grid};
use crate::error::FormulaResult;
use crate::evaluator::{EvalCtx, Value};
use wren_sheets_core::CellError;

/// Round half away from zero at the requested decimal digit.
///
/// The tie-break happens on the decimal the user sees, not the raw binary
/// value, so 2.345 rounds to 2.35 even though its double is fractionally
/// below the tie. The relative nudge stays inside the 15-significant-digit
/// envelope.
pub(crate) fn round_half_away(n: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let scaled = n * factor;
    if !scaled.is_finite() {
        return n;
    }
    let nudge = scaled.abs().max(1.0) * 1e-12;
    let rounded = (scaled.abs() + 0.5 + nudge).floor();
    rounded * scaled.signum() / factor
}

fn round_toward_zero(n: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let scaled = n * factor;
    if !scaled.is_finite() {
        return n;
    }
    let nudge = scaled.abs().max(1.0) * 1e-12;
    (scaled.abs() + nudge).floor() * scaled.signum() / factor
}

fn round_away_from_zero(n: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let scaled = n * factor;
    if !scaled.is_finite() {
        return n;
    }
    let nudge = scaled.abs().max(1.0) * 1e-12;
    (scaled.abs() - nudge).ceil() * scaled.signum() / factor
}

fn number_result(n: f64) -> Value {
    if n.is_nan() || n.is_infinite() {
        Value::Error(CellError::Num)
    } else {
        Value::Number(n)
    }
}

macro_rules! try_num {
    ($expr:expr) => {
        match $expr {
            Ok(n) => n,
            Err(e) => return Ok(Value::Error(e)),
        }
    };
}
pub(crate) use try_num;

pub(crate) fn fn_sum(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(collect_numbers(args, ctx));
    Ok(Value::Number(nums.iter().sum()))
}

pub(crate) fn fn_product(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(collect_numbers(args, ctx));
    Ok(Value::Number(nums.iter().product()))
}

pub(crate) fn fn_average(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(collect_numbers(args, ctx));
    if nums.is_empty() {
        return Ok(Value::Error(CellError::Div0));
    }
    Ok(Value::Number(nums.iter().sum::<f64>() / nums.len() as f64))
}

pub(crate) fn fn_min(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(collect_numbers(args, ctx));
    if nums.is_empty() {
        return Ok(Value::Number(0.0));
    }
    Ok(Value::Number(nums.iter().copied().fold(f64::INFINITY, f64::min)))
}

pub(crate) fn fn_max(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(collect_numbers(args, ctx));
    if nums.is_empty() {
        return Ok(Value::Number(0.0));
    }
    Ok(Value::Number(nums.iter().copied().fold(f64::NEG_INFINITY, f64::max)))
}

pub(crate) fn fn_median(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let mut nums = try_num!(collect_numbers(args, ctx));
    if nums.is_empty() {
        return Ok(Value::Error(CellError::Num));
    }
    nums.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = nums.len() / 2;
    let median = if nums.len() % 2 == 1 {
        nums[mid]
    } else {
        (nums[mid - 1] + nums[mid]) / 2.0
    };
    Ok(Value::Number(median))
}

/// COUNT: numeric values only. Errors inside a range are skipped, matching
/// worksheet counting; a direct error argument propagates.
pub(crate) fn fn_count(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let mut count = 0u32;
    for arg in args {
        match arg {
            Value::Ranges(ranges) => match ctx.resolver().expand_all(ranges) {
                Ok(cells) => {
                    count += cells
                        .iter()
                        .filter(|c| matches!(c.value, wren_sheets_core::CellValue::Number(_)))
                        .count() as u32;
                }
                Err(e) => return Ok(Value::Error(e)),
            },
            Value::Array(rows) => {
                count += rows
                    .iter()
                    .flatten()
                    .filter(|v| matches!(v, Value::Number(_)))
                    .count() as u32;
            }
            Value::Error(e) => return Ok(Value::Error(*e)),
            Value::Empty => {}
            scalar => {
                if crate::evaluator::to_number(scalar).is_ok() {
                    count += 1;
                }
            }
        }
    }
    Ok(Value::Number(f64::from(count)))
}

/// COUNTA: non-empty values of any type
pub(crate) fn fn_counta(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let mut count = 0u32;
    for arg in args {
        match arg {
            Value::Ranges(ranges) => match ctx.resolver().expand_all(ranges) {
                Ok(cells) => {
                    count += cells.iter().filter(|c| !c.value.is_empty()).count() as u32;
                }
                Err(e) => return Ok(Value::Error(e)),
            },
            Value::Array(rows) => {
                count += rows
                    .iter()
                    .flatten()
                    .filter(|v| !matches!(v, Value::Empty))
                    .count() as u32;
            }
            Value::Empty => {}
            _ => count += 1,
        }
    }
    Ok(Value::Number(f64::from(count)))
}

pub(crate) fn fn_abs(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(Value::Number(try_num!(number_arg(&args[0], ctx)).abs()))
}

pub(crate) fn fn_int(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(Value::Number(try_num!(number_arg(&args[0], ctx)).floor()))
}

pub(crate) fn fn_sign(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    Ok(Value::Number(if n > 0.0 {
        1.0
    } else if n < 0.0 {
        -1.0
    } else {
        0.0
    }))
}

pub(crate) fn fn_sqrt(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    if n < 0.0 {
        return Ok(Value::Error(CellError::Num));
    }
    Ok(Value::Number(n.sqrt()))
}

pub(crate) fn fn_power(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let base = try_num!(number_arg(&args[0], ctx));
    let exponent = try_num!(number_arg(&args[1], ctx));
    Ok(number_result(base.powf(exponent)))
}

pub(crate) fn fn_exp(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(number_result(try_num!(number_arg(&args[0], ctx)).exp()))
}

pub(crate) fn fn_ln(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    if n <= 0.0 {
        return Ok(Value::Error(CellError::Num));
    }
    Ok(Value::Number(n.ln()))
}

pub(crate) fn fn_log10(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    if n <= 0.0 {
        return Ok(Value::Error(CellError::Num));
    }
    Ok(Value::Number(n.log10()))
}

pub(crate) fn fn_log(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    let base = if args.len() > 1 {
        try_num!(number_arg(&args[1], ctx))
    } else {
        10.0
    };
    if n <= 0.0 || base <= 0.0 || base == 1.0 {
        return Ok(Value::Error(CellError::Num));
    }
    Ok(Value::Number(n.log(base)))
}

pub(crate) fn fn_pi(_args: &[Value], _ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(Value::Number(std::f64::consts::PI))
}

pub(crate) fn fn_sin(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(number_result(try_num!(number_arg(&args[0], ctx)).sin()))
}

pub(crate) fn fn_cos(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(number_result(try_num!(number_arg(&args[0], ctx)).cos()))
}

pub(crate) fn fn_tan(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(number_result(try_num!(number_arg(&args[0], ctx)).tan()))
}

pub(crate) fn fn_atan(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(Value::Number(try_num!(number_arg(&args[0], ctx)).atan()))
}

pub(crate) fn fn_atan2(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let x = try_num!(number_arg(&args[0], ctx));
    let y = try_num!(number_arg(&args[1], ctx));
    if x == 0.0 && y == 0.0 {
        return Ok(Value::Error(CellError::Div0));
    }
    Ok(Value::Number(y.atan2(x)))
}

pub(crate) fn fn_radians(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(Value::Number(try_num!(number_arg(&args[0], ctx)).to_radians()))
}

pub(crate) fn fn_degrees(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    Ok(Value::Number(try_num!(number_arg(&args[0], ctx)).to_degrees()))
}

pub(crate) fn fn_mod(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    let d = try_num!(number_arg(&args[1], ctx));
    if d == 0.0 {
        return Ok(Value::Error(CellError::Div0));
    }
    // result carries the divisor's sign
    Ok(Value::Number(n - d * (n / d).floor()))
}

pub(crate) fn fn_round(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    let digits = if args.len() > 1 {
        try_num!(number_arg(&args[1], ctx)) as i32
    } else {
        0
    };
    Ok(Value::Number(round_half_away(n, digits)))
}

pub(crate) fn fn_roundup(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    let digits = try_num!(number_arg(&args[1], ctx)) as i32;
    Ok(Value::Number(round_away_from_zero(n, digits)))
}

pub(crate) fn fn_rounddown(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    let digits = try_num!(number_arg(&args[1], ctx)) as i32;
    Ok(Value::Number(round_toward_zero(n, digits)))
}

pub(crate) fn fn_trunc(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    let digits = if args.len() > 1 {
        try_num!(number_arg(&args[1], ctx)) as i32
    } else {
        0
    };
    Ok(Value::Number(round_toward_zero(n, digits)))
}

pub(crate) fn fn_even(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    let mut r = round_away_from_zero(n, 0);
    if (r as i64) % 2 != 0 {
        r += r.signum();
    }
    Ok(Value::Number(r))
}

pub(crate) fn fn_odd(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let n = try_num!(number_arg(&args[0], ctx));
    let mut r = round_away_from_zero(n, 0);
    if (r as i64) % 2 == 0 {
        r += if r == 0.0 { 1.0 } else { r.signum() };
    }
    Ok(Value::Number(r))
}

/// Step accumulation shared by CEILING and FLOOR.
///
/// Accumulates multiples of the step by repeated addition rather than
/// divide-and-truncate, keeping the legacy rounding bias. The starting
/// point is fast-forwarded for large ratios; the final approach is always
/// by accumulation.
fn accumulate_to(num: f64, step: f64) -> f64 {
    let mut res = 0.0;
    let ratio = num / step;
    if ratio.abs() > 1e6 {
        res = step * (ratio - 2.0).trunc();
    }
    if step > 0.0 {
        while res < num {
            res += step;
        }
    } else {
        while res > num {
            res += step;
        }
    }
    res
}

pub(crate) fn fn_ceiling(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let num = try_num!(number_arg(&args[0], ctx));
    let step = try_num!(number_arg(&args[1], ctx));
    if step == 0.0 {
        return Ok(Value::Number(0.0));
    }
    if num > 0.0 && step < 0.0 {
        return Ok(Value::Error(CellError::Num));
    }
    if num >= 0.0 || step < 0.0 {
        // first multiple at or beyond num, in the step's direction
        return Ok(Value::Number(accumulate_to(num, step)));
    }
    // negative number, positive step: first multiple >= num (toward zero)
    let mut res = 0.0;
    while res - step >= num {
        res -= step;
    }
    Ok(Value::Number(res))
}

pub(crate) fn fn_floor(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let num = try_num!(number_arg(&args[0], ctx));
    let step = try_num!(number_arg(&args[1], ctx));
    if step == 0.0 {
        return Ok(Value::Error(CellError::Div0));
    }
    if num > 0.0 && step < 0.0 {
        return Ok(Value::Error(CellError::Num));
    }
    if num >= 0.0 || step < 0.0 {
        let mut res = accumulate_to(num, step);
        if res != num {
            // went one multiple past; back off
            res -= step;
        }
        return Ok(Value::Number(res));
    }
    // negative number, positive step: last multiple <= num (away from zero)
    let mut res = 0.0;
    while res >= num {
        if res == num {
            return Ok(Value::Number(res));
        }
        res -= step;
    }
    Ok(Value::Number(res))
}

pub(crate) fn fn_sumproduct(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let mut grids = Vec::with_capacity(args.len());
    for arg in args {
        if let Some(e) = arg.error() {
            return Ok(Value::Error(e));
        }
        grids.push(try_num!(value_grid(arg, ctx)));
    }
    let rows = grids[0].len();
    let cols = grids[0][0].len();
    if grids.iter().any(|g| g.len() != rows || g[0].len() != cols) {
        return Ok(Value::Error(CellError::Value));
    }
    let mut total = 0.0;
    for r in 0..rows {
        for c in 0..cols {
            let mut product = 1.0;
            for grid in &grids {
                match &grid[r][c] {
                    Value::Number(n) => product *= n,
                    Value::Error(e) => return Ok(Value::Error(*e)),
                    // non-numeric entries multiply as zero
                    _ => product *= 0.0,
                }
            }
            total += product;
        }
    }
    Ok(Value::Number(total))
}
