//! BIFF8 formula token codec.
//!
//! A stored formula is an `rgce` byte stream (the token sequence, in postfix
//! order) plus an optional trailing `rgcb` block holding the out-of-line
//! payloads: array-constant values and cached rectangle lists for
//! pre-computed reference expressions. [`decode_tokens`] consumes both and
//! produces [`Token`]s; [`encode_tokens`] is its exact inverse.
//!
//! Layout notes:
//! - Row fields are 16-bit. Column fields pack a 14-bit ordinal with two
//!   flag bits: bit 15 = row-relative, bit 14 = column-relative.
//! - Row 0xFFFF and column 0x00FF are the whole-column / whole-row
//!   sentinels. BIFF8 has no explicit marker bit, so these values are
//!   special-cased on decode rather than read as literal coordinates.
//! - Classed opcodes (references, functions, names, arrays) appear in three
//!   encodings — REF, VALUE, ARRAY — that differ only in the high opcode
//!   bits. All three decode to the same [`Token`]; encoding normalizes to
//!   the VALUE class.

pub mod reader;

use crate::token::{ArrayLiteral, ArrayValue, AreaRef, CellRef, Token};
use reader::{
    read_f64, read_i16, read_long_string, read_short_string, read_u16, read_u8, skip,
    write_string,
};
use thiserror::Error;
use wren_sheets_core::CellError;

// ── Base opcodes (unclassed) ────────────────────────────────────────────
pub const PTG_EXP: u8 = 0x01;
pub const PTG_ADD: u8 = 0x03;
pub const PTG_SUB: u8 = 0x04;
pub const PTG_MUL: u8 = 0x05;
pub const PTG_DIV: u8 = 0x06;
pub const PTG_POWER: u8 = 0x07;
pub const PTG_CONCAT: u8 = 0x08;
pub const PTG_LT: u8 = 0x09;
pub const PTG_LE: u8 = 0x0A;
pub const PTG_EQ: u8 = 0x0B;
pub const PTG_GE: u8 = 0x0C;
pub const PTG_GT: u8 = 0x0D;
pub const PTG_NE: u8 = 0x0E;
pub const PTG_ISECT: u8 = 0x0F;
pub const PTG_UNION: u8 = 0x10;
pub const PTG_RANGE: u8 = 0x11;
pub const PTG_UPLUS: u8 = 0x12;
pub const PTG_UMINUS: u8 = 0x13;
pub const PTG_PERCENT: u8 = 0x14;
pub const PTG_PAREN: u8 = 0x15;
pub const PTG_MISSARG: u8 = 0x16;
pub const PTG_STR: u8 = 0x17;
pub const PTG_ATTR: u8 = 0x19;
pub const PTG_ERR: u8 = 0x1C;
pub const PTG_BOOL: u8 = 0x1D;
pub const PTG_INT: u8 = 0x1E;
pub const PTG_NUM: u8 = 0x1F;

// ── Classed base opcodes (REF class; VALUE = +0x20, ARRAY = +0x40) ──────
pub const PTG_ARRAY: u8 = 0x20;
pub const PTG_FUNC: u8 = 0x21;
pub const PTG_FUNCVAR: u8 = 0x22;
pub const PTG_NAME: u8 = 0x23;
pub const PTG_REF: u8 = 0x24;
pub const PTG_AREA: u8 = 0x25;
pub const PTG_MEMAREA: u8 = 0x26;
pub const PTG_MEMFUNC: u8 = 0x29;
pub const PTG_REFERR: u8 = 0x2A;
pub const PTG_AREAERR: u8 = 0x2B;
pub const PTG_REFN: u8 = 0x2C;
pub const PTG_AREAN: u8 = 0x2D;
pub const PTG_NAMEX: u8 = 0x39;
pub const PTG_REF3D: u8 = 0x3A;
pub const PTG_AREA3D: u8 = 0x3B;
pub const PTG_REFERR3D: u8 = 0x3C;
pub const PTG_AREAERR3D: u8 = 0x3D;

// ── tAttr flag bits ─────────────────────────────────────────────────────
pub const ATTR_VOLATILE: u8 = 0x01;
pub const ATTR_IF: u8 = 0x02;
pub const ATTR_CHOOSE: u8 = 0x04;
pub const ATTR_SKIP: u8 = 0x08;
pub const ATTR_SUM: u8 = 0x10;
pub const ATTR_SPACE: u8 = 0x40;

// ── Array element tags ──────────────────────────────────────────────────
const SER_NIL: u8 = 0x00;
const SER_NUM: u8 = 0x01;
const SER_STR: u8 = 0x02;
const SER_BOOL: u8 = 0x04;
const SER_ERR: u8 = 0x10;

/// Whole-column sentinel stored in row fields
pub const WHOLE_COL_ROW: u16 = 0xFFFF;
/// Whole-row sentinel stored in column fields
pub const WHOLE_ROW_COL: u16 = 0x00FF;

/// Errors from decoding a token stream
///
/// These are loader-level conditions, deliberately distinct from the
/// spreadsheet error codes a formula can evaluate to.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// Stream ended inside a token
    #[error("unexpected end of token stream at offset {offset}, need {need} more bytes")]
    UnexpectedEof { offset: usize, need: usize },

    /// Byte is not a known token opcode
    #[error("unknown token opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    /// Array element tag byte is not in the SerAr set
    #[error("invalid array element tag 0x{tag:02X} at offset {offset}")]
    BadArrayTag { tag: u8, offset: usize },

    /// Error code byte is not a spreadsheet error
    #[error("invalid error code 0x{code:02X} at offset {offset}")]
    BadErrorCode { code: u8, offset: usize },

    /// String bytes are not valid UTF-16
    #[error("invalid string data at offset {offset}")]
    BadString { offset: usize },

    /// Declared subexpression length overruns the stream
    #[error("subexpression length {len} overruns the stream at offset {offset}")]
    BadSubexpression { len: usize, offset: usize },

    /// Token form this codec does not handle
    #[error("unsupported token {what} at offset {offset}")]
    Unsupported { what: &'static str, offset: usize },
}

/// The two byte blocks a formula encodes to
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EncodedFormula {
    /// The token stream
    pub rgce: Vec<u8>,
    /// Out-of-line payloads (array values, cached rectangle lists)
    pub rgcb: Vec<u8>,
}

/// Decode a formula from its token stream and out-of-line payload block.
///
/// Trailing unread `rgcb` bytes are tolerated (some writers pad) but logged.
pub fn decode_tokens(rgce: &[u8], rgcb: &[u8]) -> Result<Vec<Token>, DecodeError> {
    let mut extra = 0usize;
    let tokens = decode_stream(rgce, rgcb, &mut extra)?;
    if extra < rgcb.len() {
        log::warn!(
            "formula rgcb has {} unread trailing bytes",
            rgcb.len() - extra
        );
    }
    Ok(tokens)
}

/// Decode a formula with no out-of-line block.
pub fn decode_rgce(rgce: &[u8]) -> Result<Vec<Token>, DecodeError> {
    decode_tokens(rgce, &[])
}

fn decode_stream(
    rgce: &[u8],
    rgcb: &[u8],
    extra: &mut usize,
) -> Result<Vec<Token>, DecodeError> {
    let mut offset = 0usize;
    let mut tokens = Vec::new();
    while offset < rgce.len() {
        tokens.push(decode_token(rgce, &mut offset, rgcb, extra)?);
    }
    Ok(tokens)
}

/// Map a classed opcode to its base (REF-class) value, if it is classed.
fn base_opcode(opcode: u8) -> u8 {
    match opcode {
        0x20..=0x3D => opcode,
        0x40..=0x5D => opcode - 0x20,
        0x60..=0x7D => opcode - 0x40,
        _ => opcode,
    }
}

fn decode_token(
    rgce: &[u8],
    offset: &mut usize,
    rgcb: &[u8],
    extra: &mut usize,
) -> Result<Token, DecodeError> {
    let opcode_offset = *offset;
    let opcode = read_u8(rgce, offset)?;

    let token = match opcode {
        PTG_EXP => {
            let row = read_u16(rgce, offset)?;
            let col = read_u16(rgce, offset)?;
            Token::Exp { row, col }
        }
        PTG_ADD => Token::Add,
        PTG_SUB => Token::Sub,
        PTG_MUL => Token::Mul,
        PTG_DIV => Token::Div,
        PTG_POWER => Token::Power,
        PTG_CONCAT => Token::Concat,
        PTG_LT => Token::Lt,
        PTG_LE => Token::Le,
        PTG_EQ => Token::Eq,
        PTG_GE => Token::Ge,
        PTG_GT => Token::Gt,
        PTG_NE => Token::Ne,
        PTG_ISECT => Token::Isect,
        PTG_UNION => Token::Union,
        PTG_RANGE => Token::Range,
        PTG_UPLUS => Token::UPlus,
        PTG_UMINUS => Token::UMinus,
        PTG_PERCENT => Token::Percent,
        PTG_PAREN => Token::Paren,
        PTG_MISSARG => Token::MissingArg,
        PTG_STR => Token::Str(read_short_string(rgce, offset)?),
        PTG_ATTR => {
            let flags = read_u8(rgce, offset)?;
            let data = read_u16(rgce, offset)?;
            if flags & ATTR_CHOOSE != 0 {
                // tAttrChoose carries a jump table we cannot round-trip
                return Err(DecodeError::Unsupported {
                    what: "tAttrChoose",
                    offset: opcode_offset,
                });
            }
            Token::Attr { flags, data }
        }
        PTG_ERR => {
            let code = read_u8(rgce, offset)?;
            let err = CellError::from_code(code).ok_or(DecodeError::BadErrorCode {
                code,
                offset: opcode_offset + 1,
            })?;
            Token::Err(err)
        }
        PTG_BOOL => Token::Bool(read_u8(rgce, offset)? != 0),
        PTG_INT => Token::Int(read_u16(rgce, offset)?),
        PTG_NUM => Token::Number(read_f64(rgce, offset)?),

        _ => match base_opcode(opcode) {
            PTG_ARRAY => {
                // Token body is 7 reserved bytes; values live in rgcb.
                skip(rgce, offset, 7)?;
                Token::Array(read_array_values(rgcb, extra)?)
            }
            PTG_FUNC => Token::Func {
                iftab: read_u16(rgce, offset)?,
            },
            PTG_FUNCVAR => {
                let argc = read_u8(rgce, offset)? & 0x7F;
                // top bit of iftab is the fPrompt flag; not part of the id
                let iftab = read_u16(rgce, offset)? & 0x7FFF;
                Token::FuncVar { iftab, argc }
            }
            PTG_NAME => {
                let index = read_u16(rgce, offset)?;
                skip(rgce, offset, 2)?;
                Token::Name { index }
            }
            PTG_REF => Token::Ref(read_cell_ref(rgce, offset, true)?),
            PTG_AREA => Token::Area(read_area_ref(rgce, offset, true)?),
            PTG_MEMAREA => {
                skip(rgce, offset, 4)?;
                let subex = read_subexpression(rgce, offset, rgcb, extra)?;
                let ranges = read_extra_mem(rgcb, extra)?;
                Token::MemArea { ranges, subex }
            }
            PTG_MEMFUNC => Token::MemFunc(read_subexpression(rgce, offset, rgcb, extra)?),
            PTG_REFERR => {
                skip(rgce, offset, 4)?;
                Token::RefErr
            }
            PTG_AREAERR => {
                skip(rgce, offset, 8)?;
                Token::AreaErr
            }
            PTG_REFN => Token::RefN(read_cell_ref(rgce, offset, false)?),
            PTG_AREAN => Token::AreaN(read_area_ref(rgce, offset, false)?),
            PTG_NAMEX => {
                let ixti = read_i16(rgce, offset)?;
                let index = read_u16(rgce, offset)?;
                skip(rgce, offset, 2)?;
                Token::NameX { ixti, index }
            }
            PTG_REF3D => {
                let ixti = read_i16(rgce, offset)?;
                let cell = read_cell_ref(rgce, offset, true)?;
                Token::Ref3d { ixti, cell }
            }
            PTG_AREA3D => {
                let ixti = read_i16(rgce, offset)?;
                let area = read_area_ref(rgce, offset, true)?;
                Token::Area3d { ixti, area }
            }
            PTG_REFERR3D => {
                let ixti = read_i16(rgce, offset)?;
                skip(rgce, offset, 4)?;
                Token::RefErr3d { ixti }
            }
            PTG_AREAERR3D => {
                let ixti = read_i16(rgce, offset)?;
                skip(rgce, offset, 8)?;
                Token::AreaErr3d { ixti }
            }
            other => {
                return Err(DecodeError::UnknownOpcode {
                    opcode: other,
                    offset: opcode_offset,
                })
            }
        },
    };
    Ok(token)
}

/// Read a cell reference body: row u16, then col+flags u16.
///
/// `sentinels` enables the whole-row/column special cases; the
/// shared-formula offset forms store signed offsets in the same fields and
/// must not interpret them.
fn read_cell_ref(
    data: &[u8],
    offset: &mut usize,
    sentinels: bool,
) -> Result<CellRef, DecodeError> {
    let row = read_u16(data, offset)?;
    let packed = read_u16(data, offset)?;
    let col = packed & 0x3FFF;
    Ok(CellRef {
        row,
        col,
        row_rel: packed & 0x8000 != 0,
        col_rel: packed & 0x4000 != 0,
        whole_col: sentinels && row == WHOLE_COL_ROW,
        whole_row: sentinels && col == WHOLE_ROW_COL,
    })
}

/// Read an area body: firstRow, lastRow, firstCol+flags, lastCol+flags.
fn read_area_ref(
    data: &[u8],
    offset: &mut usize,
    sentinels: bool,
) -> Result<AreaRef, DecodeError> {
    let first_row = read_u16(data, offset)?;
    let last_row = read_u16(data, offset)?;
    let first_packed = read_u16(data, offset)?;
    let last_packed = read_u16(data, offset)?;
    let unpack = |row: u16, packed: u16| CellRef {
        row,
        col: packed & 0x3FFF,
        row_rel: packed & 0x8000 != 0,
        col_rel: packed & 0x4000 != 0,
        whole_col: sentinels && row == WHOLE_COL_ROW,
        whole_row: sentinels && (packed & 0x3FFF) == WHOLE_ROW_COL,
    };
    Ok(AreaRef {
        first: unpack(first_row, first_packed),
        last: unpack(last_row, last_packed),
    })
}

/// Read a length-prefixed inline subexpression and decode it recursively.
fn read_subexpression(
    rgce: &[u8],
    offset: &mut usize,
    rgcb: &[u8],
    extra: &mut usize,
) -> Result<Vec<Token>, DecodeError> {
    let len_offset = *offset;
    let cce = read_u16(rgce, offset)? as usize;
    if *offset + cce > rgce.len() {
        return Err(DecodeError::BadSubexpression {
            len: cce,
            offset: len_offset,
        });
    }
    let sub = &rgce[*offset..*offset + cce];
    *offset += cce;
    decode_stream(sub, rgcb, extra)
}

/// Read an array constant's values from the rgcb block.
fn read_array_values(rgcb: &[u8], extra: &mut usize) -> Result<ArrayLiteral, DecodeError> {
    let cols = read_u8(rgcb, extra)? as usize + 1;
    let rows = read_u16(rgcb, extra)? as usize + 1;

    let mut grid = Vec::with_capacity(rows);
    for _ in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for _ in 0..cols {
            let tag_offset = *extra;
            let tag = read_u8(rgcb, extra)?;
            let value = match tag {
                SER_NIL => {
                    skip(rgcb, extra, 8)?;
                    ArrayValue::Empty
                }
                SER_NUM => ArrayValue::Number(read_f64(rgcb, extra)?),
                SER_STR => ArrayValue::Str(read_long_string(rgcb, extra)?),
                SER_BOOL => {
                    let b = read_u8(rgcb, extra)? != 0;
                    skip(rgcb, extra, 7)?;
                    ArrayValue::Bool(b)
                }
                SER_ERR => {
                    let code = read_u8(rgcb, extra)?;
                    let err = CellError::from_code(code).ok_or(DecodeError::BadErrorCode {
                        code,
                        offset: tag_offset + 1,
                    })?;
                    skip(rgcb, extra, 7)?;
                    ArrayValue::Err(err)
                }
                other => {
                    return Err(DecodeError::BadArrayTag {
                        tag: other,
                        offset: tag_offset,
                    })
                }
            };
            row.push(value);
        }
        grid.push(row);
    }
    // rows >= 1 and cols >= 1 by construction, so the shape check holds
    ArrayLiteral::new(grid).ok_or(DecodeError::BadSubexpression {
        len: 0,
        offset: *extra,
    })
}

/// Read a cached rectangle list (cAreas u16, then 8-byte rectangles).
fn read_extra_mem(rgcb: &[u8], extra: &mut usize) -> Result<Vec<AreaRef>, DecodeError> {
    let count = read_u16(rgcb, extra)? as usize;
    let mut ranges = Vec::with_capacity(count);
    for _ in 0..count {
        ranges.push(read_area_ref(rgcb, extra, true)?);
    }
    Ok(ranges)
}

/// Encode a token sequence to its rgce/rgcb pair. Exact inverse of
/// [`decode_tokens`] for every valid token.
pub fn encode_tokens(tokens: &[Token]) -> EncodedFormula {
    let mut out = EncodedFormula::default();
    for token in tokens {
        encode_token(token, &mut out.rgce, &mut out.rgcb);
    }
    out
}

/// VALUE-class form of a classed base opcode.
fn value_class(base: u8) -> u8 {
    base + 0x20
}

fn encode_token(token: &Token, rgce: &mut Vec<u8>, rgcb: &mut Vec<u8>) {
    match token {
        Token::Exp { row, col } => {
            rgce.push(PTG_EXP);
            rgce.extend_from_slice(&row.to_le_bytes());
            rgce.extend_from_slice(&col.to_le_bytes());
        }
        Token::Add => rgce.push(PTG_ADD),
        Token::Sub => rgce.push(PTG_SUB),
        Token::Mul => rgce.push(PTG_MUL),
        Token::Div => rgce.push(PTG_DIV),
        Token::Power => rgce.push(PTG_POWER),
        Token::Concat => rgce.push(PTG_CONCAT),
        Token::Lt => rgce.push(PTG_LT),
        Token::Le => rgce.push(PTG_LE),
        Token::Eq => rgce.push(PTG_EQ),
        Token::Ge => rgce.push(PTG_GE),
        Token::Gt => rgce.push(PTG_GT),
        Token::Ne => rgce.push(PTG_NE),
        Token::Isect => rgce.push(PTG_ISECT),
        Token::Union => rgce.push(PTG_UNION),
        Token::Range => rgce.push(PTG_RANGE),
        Token::UPlus => rgce.push(PTG_UPLUS),
        Token::UMinus => rgce.push(PTG_UMINUS),
        Token::Percent => rgce.push(PTG_PERCENT),
        Token::Paren => rgce.push(PTG_PAREN),
        Token::MissingArg => rgce.push(PTG_MISSARG),
        Token::Str(s) => {
            rgce.push(PTG_STR);
            write_string(rgce, s, false);
        }
        Token::Attr { flags, data } => {
            rgce.push(PTG_ATTR);
            rgce.push(*flags);
            rgce.extend_from_slice(&data.to_le_bytes());
        }
        Token::Err(e) => {
            rgce.push(PTG_ERR);
            rgce.push(e.code());
        }
        Token::Bool(b) => {
            rgce.push(PTG_BOOL);
            rgce.push(u8::from(*b));
        }
        Token::Int(v) => {
            rgce.push(PTG_INT);
            rgce.extend_from_slice(&v.to_le_bytes());
        }
        Token::Number(n) => {
            rgce.push(PTG_NUM);
            rgce.extend_from_slice(&n.to_le_bytes());
        }
        Token::Array(array) => {
            rgce.push(value_class(PTG_ARRAY));
            rgce.extend_from_slice(&[0u8; 7]);
            write_array_values(array, rgcb);
        }
        Token::Func { iftab } => {
            rgce.push(value_class(PTG_FUNC));
            rgce.extend_from_slice(&iftab.to_le_bytes());
        }
        Token::FuncVar { iftab, argc } => {
            rgce.push(value_class(PTG_FUNCVAR));
            rgce.push(argc & 0x7F);
            rgce.extend_from_slice(&(iftab & 0x7FFF).to_le_bytes());
        }
        Token::Name { index } => {
            rgce.push(value_class(PTG_NAME));
            rgce.extend_from_slice(&index.to_le_bytes());
            rgce.extend_from_slice(&[0u8; 2]);
        }
        Token::Ref(r) => {
            rgce.push(value_class(PTG_REF));
            write_cell_ref(r, rgce);
        }
        Token::Area(a) => {
            rgce.push(value_class(PTG_AREA));
            write_area_ref(a, rgce);
        }
        Token::MemArea { ranges, subex } => {
            rgce.push(value_class(PTG_MEMAREA));
            rgce.extend_from_slice(&[0u8; 4]);
            write_subexpression(subex, rgce, rgcb);
            rgcb.extend_from_slice(&(ranges.len() as u16).to_le_bytes());
            for range in ranges {
                write_area_ref(range, rgcb);
            }
        }
        Token::MemFunc(subex) => {
            rgce.push(value_class(PTG_MEMFUNC));
            write_subexpression(subex, rgce, rgcb);
        }
        Token::RefErr => {
            rgce.push(value_class(PTG_REFERR));
            rgce.extend_from_slice(&[0u8; 4]);
        }
        Token::AreaErr => {
            rgce.push(value_class(PTG_AREAERR));
            rgce.extend_from_slice(&[0u8; 8]);
        }
        Token::RefN(r) => {
            rgce.push(value_class(PTG_REFN));
            write_cell_ref(r, rgce);
        }
        Token::AreaN(a) => {
            rgce.push(value_class(PTG_AREAN));
            write_area_ref(a, rgce);
        }
        Token::NameX { ixti, index } => {
            rgce.push(value_class(PTG_NAMEX));
            rgce.extend_from_slice(&ixti.to_le_bytes());
            rgce.extend_from_slice(&index.to_le_bytes());
            rgce.extend_from_slice(&[0u8; 2]);
        }
        Token::Ref3d { ixti, cell } => {
            rgce.push(value_class(PTG_REF3D));
            rgce.extend_from_slice(&ixti.to_le_bytes());
            write_cell_ref(cell, rgce);
        }
        Token::Area3d { ixti, area } => {
            rgce.push(value_class(PTG_AREA3D));
            rgce.extend_from_slice(&ixti.to_le_bytes());
            write_area_ref(area, rgce);
        }
        Token::RefErr3d { ixti } => {
            rgce.push(value_class(PTG_REFERR3D));
            rgce.extend_from_slice(&ixti.to_le_bytes());
            rgce.extend_from_slice(&[0u8; 4]);
        }
        Token::AreaErr3d { ixti } => {
            rgce.push(value_class(PTG_AREAERR3D));
            rgce.extend_from_slice(&ixti.to_le_bytes());
            rgce.extend_from_slice(&[0u8; 8]);
        }
    }
}

fn pack_col(r: &CellRef) -> u16 {
    let mut packed = r.col & 0x3FFF;
    if r.row_rel {
        packed |= 0x8000;
    }
    if r.col_rel {
        packed |= 0x4000;
    }
    packed
}

fn write_cell_ref(r: &CellRef, out: &mut Vec<u8>) {
    let row = if r.whole_col { WHOLE_COL_ROW } else { r.row };
    out.extend_from_slice(&row.to_le_bytes());
    let mut packed = pack_col(r);
    if r.whole_row {
        packed = (packed & 0xC000) | WHOLE_ROW_COL;
    }
    out.extend_from_slice(&packed.to_le_bytes());
}

fn write_area_ref(a: &AreaRef, out: &mut Vec<u8>) {
    let first_row = if a.first.whole_col {
        WHOLE_COL_ROW
    } else {
        a.first.row
    };
    let last_row = if a.last.whole_col {
        WHOLE_COL_ROW
    } else {
        a.last.row
    };
    out.extend_from_slice(&first_row.to_le_bytes());
    out.extend_from_slice(&last_row.to_le_bytes());
    let mut first_packed = pack_col(&a.first);
    if a.first.whole_row {
        first_packed = (first_packed & 0xC000) | WHOLE_ROW_COL;
    }
    let mut last_packed = pack_col(&a.last);
    if a.last.whole_row {
        last_packed = (last_packed & 0xC000) | WHOLE_ROW_COL;
    }
    out.extend_from_slice(&first_packed.to_le_bytes());
    out.extend_from_slice(&last_packed.to_le_bytes());
}

fn write_subexpression(subex: &[Token], rgce: &mut Vec<u8>, rgcb: &mut Vec<u8>) {
    let mut sub = Vec::new();
    for token in subex {
        encode_token(token, &mut sub, rgcb);
    }
    rgce.extend_from_slice(&(sub.len() as u16).to_le_bytes());
    rgce.extend_from_slice(&sub);
}

/// Write an array constant's values. The `columns-1`/`rows-1` header is
/// re-derived from the literal's live shape.
fn write_array_values(array: &ArrayLiteral, rgcb: &mut Vec<u8>) {
    rgcb.push((array.cols() - 1) as u8);
    rgcb.extend_from_slice(&((array.row_count() - 1) as u16).to_le_bytes());
    for row in array.values() {
        for value in row {
            match value {
                ArrayValue::Empty => {
                    rgcb.push(SER_NIL);
                    rgcb.extend_from_slice(&[0u8; 8]);
                }
                ArrayValue::Number(n) => {
                    rgcb.push(SER_NUM);
                    rgcb.extend_from_slice(&n.to_le_bytes());
                }
                ArrayValue::Str(s) => {
                    rgcb.push(SER_STR);
                    write_string(rgcb, s, true);
                }
                ArrayValue::Bool(b) => {
                    rgcb.push(SER_BOOL);
                    rgcb.push(u8::from(*b));
                    rgcb.extend_from_slice(&[0u8; 7]);
                }
                ArrayValue::Err(e) => {
                    rgcb.push(SER_ERR);
                    rgcb.push(e.code());
                    rgcb.extend_from_slice(&[0u8; 7]);
                }
            }
        }
    }
}
