//! Criteria matching for SUMIF and COUNTIF
//!
//! A criterion can be:
//! - A number: exact match (e.g., 5)
//! - A text string: case-insensitive match (e.g., "apple")
//! - A comparison expression: ">5", ">=10", "<100", "<=50", "<>0", "=5"
//! - Wildcards: "*" matches any characters, "?" matches a single character
//! - Empty: matches empty cells

use super::math::try_num;
use crate::error::FormulaResult;
use crate::evaluator::{deref_value, EvalCtx, Value};
use crate::resolver::ResolvedCell;
use wren_sheets_core::CellError;

/// Criteria matcher shared by the *IF aggregation family
#[derive(Debug)]
pub struct CriteriaMatcher {
    criteria_type: CriteriaType,
}

#[derive(Debug)]
enum CriteriaType {
    /// Exact number match
    Number(f64),
    /// Comparison with number (operator, value)
    Comparison(ComparisonOp, f64),
    /// Text match (case-insensitive, with wildcards)
    Text(String),
    /// Match empty values
    Empty,
}

#[derive(Debug, Clone, Copy)]
enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl CriteriaMatcher {
    /// Build a matcher from an evaluated criterion value
    pub fn new(criteria: &Value) -> Self {
        let criteria_type = match criteria {
            Value::Number(n) => CriteriaType::Number(*n),
            Value::Bool(b) => CriteriaType::Number(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => Self::parse_string_criteria(s),
            Value::Empty => CriteriaType::Empty,
            // errors and composites match nothing
            _ => CriteriaType::Empty,
        };
        Self { criteria_type }
    }

    fn parse_string_criteria(s: &str) -> CriteriaType {
        let s = s.trim();
        if s.is_empty() {
            return CriteriaType::Empty;
        }
        if let Some(ct) = Self::try_parse_comparison(s) {
            return ct;
        }
        if let Ok(n) = s.parse::<f64>() {
            return CriteriaType::Number(n);
        }
        CriteriaType::Text(s.to_lowercase())
    }

    fn try_parse_comparison(s: &str) -> Option<CriteriaType> {
        // longer operators first
        let (op, rest) = if let Some(rest) = s.strip_prefix(">=") {
            (ComparisonOp::GreaterEqual, rest)
        } else if let Some(rest) = s.strip_prefix("<=") {
            (ComparisonOp::LessEqual, rest)
        } else if let Some(rest) = s.strip_prefix("<>") {
            (ComparisonOp::NotEqual, rest)
        } else if let Some(rest) = s.strip_prefix('>') {
            (ComparisonOp::GreaterThan, rest)
        } else if let Some(rest) = s.strip_prefix('<') {
            (ComparisonOp::LessThan, rest)
        } else if let Some(rest) = s.strip_prefix('=') {
            (ComparisonOp::Equal, rest)
        } else {
            return None;
        };

        rest.trim()
            .parse::<f64>()
            .ok()
            .map(|n| CriteriaType::Comparison(op, n))
    }

    /// Whether a cell value matches the criterion
    pub fn matches(&self, value: &Value) -> bool {
        match &self.criteria_type {
            CriteriaType::Number(criteria_num) => match value {
                // text that looks numeric does not match a number criterion
                Value::Number(n) => (n - criteria_num).abs() < 1e-10,
                Value::Bool(b) => {
                    let n = if *b { 1.0 } else { 0.0 };
                    (n - criteria_num).abs() < 1e-10
                }
                _ => false,
            },
            CriteriaType::Comparison(op, criteria_num) => {
                let n = match value {
                    Value::Number(n) => *n,
                    Value::Bool(true) => 1.0,
                    Value::Bool(false) => 0.0,
                    _ => return false,
                };
                match op {
                    ComparisonOp::Equal => (n - criteria_num).abs() < 1e-10,
                    ComparisonOp::NotEqual => (n - criteria_num).abs() >= 1e-10,
                    ComparisonOp::LessThan => n < *criteria_num,
                    ComparisonOp::LessEqual => n <= *criteria_num,
                    ComparisonOp::GreaterThan => n > *criteria_num,
                    ComparisonOp::GreaterEqual => n >= *criteria_num,
                }
            }
            CriteriaType::Text(pattern) => {
                let text = match value {
                    Value::Str(s) => s.to_lowercase(),
                    Value::Bool(true) => "true".to_string(),
                    Value::Bool(false) => "false".to_string(),
                    Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                        format!("{}", *n as i64)
                    }
                    Value::Number(n) => format!("{}", n),
                    _ => return false,
                };
                wildcard_match(pattern, &text)
            }
            CriteriaType::Empty => {
                matches!(value, Value::Empty) || matches!(value, Value::Str(s) if s.is_empty())
            }
        }
    }
}

/// Match with wildcards: `*` = any characters, `?` = one character
fn wildcard_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') && !pattern.contains('?') {
        return pattern == text;
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    let mut star_pi = None;
    let mut star_ti = 0;

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == text[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star_pi = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(sp) = star_pi {
            pi = sp + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }
    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }
    pi == pattern.len()
}

fn range_cells(arg: &Value, ctx: &EvalCtx) -> Result<Vec<ResolvedCell>, CellError> {
    match arg {
        Value::Ranges(ranges) => ctx.resolver().expand_all(ranges),
        _ => Err(CellError::Value),
    }
}

pub(crate) fn fn_countif(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let cells = try_num!(range_cells(&args[0], ctx));
    let matcher = CriteriaMatcher::new(&deref_value(args[1].clone(), ctx));
    let count = cells
        .iter()
        .filter(|c| matcher.matches(&Value::from(c.value.clone())))
        .count();
    Ok(Value::Number(count as f64))
}

pub(crate) fn fn_sumif(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let test_cells = try_num!(range_cells(&args[0], ctx));
    let matcher = CriteriaMatcher::new(&deref_value(args[1].clone(), ctx));
    let sum_cells = if args.len() > 2 {
        Some(try_num!(range_cells(&args[2], ctx)))
    } else {
        None
    };

    let mut total = 0.0;
    for (i, cell) in test_cells.iter().enumerate() {
        if !matcher.matches(&Value::from(cell.value.clone())) {
            continue;
        }
        let source = match &sum_cells {
            // the sum range pairs positionally with the test range
            Some(cells) => match cells.get(i) {
                Some(c) => &c.value,
                None => continue,
            },
            None => &cell.value,
        };
        match source {
            wren_sheets_core::CellValue::Number(n) => total += n,
            wren_sheets_core::CellValue::Error(e) => return Ok(Value::Error(*e)),
            _ => {}
        }
    }
    Ok(Value::Number(total))
}
