//! Non-constant reference expressions
//!
//! A "memory function" token holds a sub-expression built from the union
//! (`,`), intersection (space), and range (`:`) operators applied to other
//! reference tokens or named ranges. It cannot be resolved by layout alone;
//! it must be *evaluated* to produce its final set of ranges.
//!
//! This module owns the expression shape: a small fixed AST over leaf
//! references, built either from the decoded postfix token sequence or from
//! text via an explicit operator-precedence parser (range binds tighter
//! than intersection, which binds tighter than union; parentheses group).
//! Evaluation against a workbook lives in [`crate::resolver`].

use crate::error::{FormulaError, FormulaResult};
use crate::token::{CellRef, Token};
use wren_sheets_core::CellAddress;

/// A reference expression
#[derive(Debug, Clone, PartialEq)]
pub enum RefExpr {
    /// A leaf reference token (cell, area, 3-D, name index, …)
    Leaf(Token),
    /// A named range referenced by text (from the text parser)
    Named(String),
    /// `a:b` — bounding box of the two operands
    Range(Box<RefExpr>, Box<RefExpr>),
    /// `a,b` — union of the two operands
    Union(Box<RefExpr>, Box<RefExpr>),
    /// `a b` — intersection of the two operands
    Isect(Box<RefExpr>, Box<RefExpr>),
}

impl RefExpr {
    /// Build the expression from a decoded postfix token sequence.
    ///
    /// Reference operands push leaves; `:`/`,`/space pop two. A dangling
    /// operator or leftover operand is a malformed expression, reported as
    /// an error rather than a partial result.
    pub fn from_postfix(tokens: &[Token]) -> FormulaResult<RefExpr> {
        let mut stack: Vec<RefExpr> = Vec::new();
        for token in tokens {
            match token {
                Token::Range | Token::Union | Token::Isect => {
                    let right = stack.pop();
                    let left = stack.pop();
                    let (left, right) = match (left, right) {
                        (Some(l), Some(r)) => (Box::new(l), Box::new(r)),
                        _ => {
                            return Err(FormulaError::Malformed(
                                "reference operator with missing operand".into(),
                            ))
                        }
                    };
                    stack.push(match token {
                        Token::Range => RefExpr::Range(left, right),
                        Token::Union => RefExpr::Union(left, right),
                        _ => RefExpr::Isect(left, right),
                    });
                }
                Token::Paren | Token::Attr { .. } => {}
                t if t.is_reference() => stack.push(RefExpr::Leaf(t.clone())),
                other => {
                    return Err(FormulaError::Malformed(format!(
                        "unexpected token in reference expression: {:?}",
                        other
                    )))
                }
            }
        }
        match (stack.pop(), stack.is_empty()) {
            (Some(expr), true) => Ok(expr),
            _ => Err(FormulaError::Malformed(
                "reference expression does not reduce to one result".into(),
            )),
        }
    }

    /// Flatten back to a postfix token sequence (the stored MemFunc form).
    ///
    /// `Named` leaves cannot be stored without a name-table index, so they
    /// are rejected here.
    pub fn to_postfix(&self) -> FormulaResult<Vec<Token>> {
        let mut out = Vec::new();
        self.emit(&mut out)?;
        Ok(out)
    }

    fn emit(&self, out: &mut Vec<Token>) -> FormulaResult<()> {
        match self {
            RefExpr::Leaf(t) => out.push(t.clone()),
            RefExpr::Named(name) => {
                return Err(FormulaError::InvalidReference(format!(
                    "unresolved name '{}' in reference expression",
                    name
                )))
            }
            RefExpr::Range(l, r) => {
                l.emit(out)?;
                r.emit(out)?;
                out.push(Token::Range);
            }
            RefExpr::Union(l, r) => {
                l.emit(out)?;
                r.emit(out)?;
                out.push(Token::Union);
            }
            RefExpr::Isect(l, r) => {
                l.emit(out)?;
                r.emit(out)?;
                out.push(Token::Isect);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Range,
    Isect,
    Union,
    Open,
}

fn precedence(op: Op) -> u8 {
    match op {
        Op::Range => 3,
        Op::Isect => 2,
        Op::Union => 1,
        Op::Open => 0,
    }
}

/// Parse a textual reference expression like `A1:B4,D2` or `A1:C3 B2:D4`.
///
/// This is the formula-entry path: plain addresses become reference leaves
/// (keeping their `$` flags), other identifiers become named leaves to be
/// resolved against the workbook at evaluation time. Unbalanced grouping or
/// a dangling operator is an error.
pub fn parse_text(text: &str) -> FormulaResult<RefExpr> {
    let mut output: Vec<RefExpr> = Vec::new();
    let mut ops: Vec<Op> = Vec::new();

    let apply = |output: &mut Vec<RefExpr>, op: Op| -> FormulaResult<()> {
        let right = output.pop();
        let left = output.pop();
        let (left, right) = match (left, right) {
            (Some(l), Some(r)) => (Box::new(l), Box::new(r)),
            _ => {
                return Err(FormulaError::Malformed(
                    "dangling operator in reference expression".into(),
                ))
            }
        };
        output.push(match op {
            Op::Range => RefExpr::Range(left, right),
            Op::Isect => RefExpr::Isect(left, right),
            Op::Union => RefExpr::Union(left, right),
            Op::Open => unreachable!(),
        });
        Ok(())
    };

    let push_op = |output: &mut Vec<RefExpr>, ops: &mut Vec<Op>, op: Op| -> FormulaResult<()> {
        while let Some(&top) = ops.last() {
            if top != Op::Open && precedence(top) >= precedence(op) {
                ops.pop();
                apply(output, top)?;
            } else {
                break;
            }
        }
        ops.push(op);
        Ok(())
    };

    let bytes: Vec<char> = text.chars().collect();
    let mut i = 0;
    // whether the previous significant token can end an operand
    let mut after_operand = false;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            '(' => {
                ops.push(Op::Open);
                after_operand = false;
                i += 1;
            }
            ')' => {
                loop {
                    match ops.pop() {
                        Some(Op::Open) => break,
                        Some(op) => apply(&mut output, op)?,
                        None => {
                            return Err(FormulaError::Malformed(
                                "unbalanced ')' in reference expression".into(),
                            ))
                        }
                    }
                }
                after_operand = true;
                i += 1;
            }
            ':' => {
                push_op(&mut output, &mut ops, Op::Range)?;
                after_operand = false;
                i += 1;
            }
            ',' => {
                push_op(&mut output, &mut ops, Op::Union)?;
                after_operand = false;
                i += 1;
            }
            ' ' => {
                // a run of spaces is one intersection, and only between operands
                while i < bytes.len() && bytes[i] == ' ' {
                    i += 1;
                }
                let starts_operand = bytes
                    .get(i)
                    .map(|&c| c == '(' || c == '$' || c.is_ascii_alphanumeric() || c == '_')
                    .unwrap_or(false);
                if after_operand && starts_operand {
                    push_op(&mut output, &mut ops, Op::Isect)?;
                    after_operand = false;
                }
            }
            c if c == '$' || c.is_ascii_alphanumeric() || c == '_' || c == '.' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i] == '$'
                        || bytes[i].is_ascii_alphanumeric()
                        || bytes[i] == '_'
                        || bytes[i] == '.')
                {
                    i += 1;
                }
                let atom: String = bytes[start..i].iter().collect();
                output.push(leaf_from_atom(&atom)?);
                after_operand = true;
            }
            other => {
                return Err(FormulaError::Malformed(format!(
                    "unexpected character '{}' in reference expression",
                    other
                )))
            }
        }
    }

    while let Some(op) = ops.pop() {
        if op == Op::Open {
            return Err(FormulaError::Malformed(
                "unbalanced '(' in reference expression".into(),
            ));
        }
        apply(&mut output, op)?;
    }

    match (output.pop(), output.is_empty()) {
        (Some(expr), true) => Ok(expr),
        _ => Err(FormulaError::Malformed(
            "reference expression does not reduce to one result".into(),
        )),
    }
}

fn leaf_from_atom(atom: &str) -> FormulaResult<RefExpr> {
    if let Ok(addr) = CellAddress::parse(atom) {
        return Ok(RefExpr::Leaf(Token::Ref(CellRef::from_address(addr))));
    }
    let mut chars = atom.chars();
    let valid_name = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && atom.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid_name {
        Ok(RefExpr::Named(atom.to_string()))
    } else {
        Err(FormulaError::Malformed(format!(
            "'{}' is neither an address nor a name",
            atom
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn leaf(addr: &str) -> RefExpr {
        RefExpr::Leaf(Token::Ref(CellRef::from_address(
            CellAddress::parse(addr).unwrap(),
        )))
    }

    #[test]
    fn test_parse_single_ref() {
        assert_eq!(parse_text("B2").unwrap(), leaf("B2"));
    }

    #[test]
    fn test_parse_range_binds_tighter_than_union() {
        // A1:B2,C3 == (A1:B2),C3
        let expr = parse_text("A1:B2,C3").unwrap();
        assert_eq!(
            expr,
            RefExpr::Union(
                Box::new(RefExpr::Range(Box::new(leaf("A1")), Box::new(leaf("B2")))),
                Box::new(leaf("C3")),
            )
        );
    }

    #[test]
    fn test_parse_intersection_space() {
        let expr = parse_text("A1:C3 B2:D4").unwrap();
        assert_eq!(
            expr,
            RefExpr::Isect(
                Box::new(RefExpr::Range(Box::new(leaf("A1")), Box::new(leaf("C3")))),
                Box::new(RefExpr::Range(Box::new(leaf("B2")), Box::new(leaf("D4")))),
            )
        );
    }

    #[test]
    fn test_parse_grouping() {
        // (A1,B1):C3 — union grouped, then range
        let expr = parse_text("(A1,B1):C3").unwrap();
        assert_eq!(
            expr,
            RefExpr::Range(
                Box::new(RefExpr::Union(Box::new(leaf("A1")), Box::new(leaf("B1")))),
                Box::new(leaf("C3")),
            )
        );
    }

    #[test]
    fn test_parse_named_range() {
        let expr = parse_text("Totals,B2").unwrap();
        assert_eq!(
            expr,
            RefExpr::Union(
                Box::new(RefExpr::Named("Totals".into())),
                Box::new(leaf("B2")),
            )
        );
    }

    #[test]
    fn test_parse_malformed_is_error() {
        assert!(parse_text("A1,").is_err());
        assert!(parse_text(",A1").is_err());
        assert!(parse_text("(A1,B1").is_err());
        assert!(parse_text("A1)").is_err());
        assert!(parse_text("A1 + B1").is_err());
        assert!(parse_text("").is_err());
    }

    #[test]
    fn test_postfix_roundtrip() {
        let expr = parse_text("A1:B2,C3 D4").unwrap();
        let tokens = expr.to_postfix().unwrap();
        assert_eq!(RefExpr::from_postfix(&tokens).unwrap(), expr);
    }

    #[test]
    fn test_from_postfix_rejects_dangling_operator() {
        let tokens = vec![Token::Ref(CellRef::new(0, 0)), Token::Union];
        assert!(RefExpr::from_postfix(&tokens).is_err());
    }

    #[test]
    fn test_from_postfix_rejects_leftover_operand() {
        let tokens = vec![
            Token::Ref(CellRef::new(0, 0)),
            Token::Ref(CellRef::new(1, 1)),
        ];
        assert!(RefExpr::from_postfix(&tokens).is_err());
    }
}
