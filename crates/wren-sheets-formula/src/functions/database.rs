//! Database (criteria range-query) functions
//!
//! The D-functions take three arguments: a database range whose first row
//! labels its columns, a field selector, and a criteria range. The criteria
//! table's *shape* alone selects the matching layout:
//!
//! - N rows × 1 column — OR down the rows: any matching criterion passes
//! - 1 row × N columns — AND across the columns; a field named more than
//!   once carries OR'd alternatives
//! - N rows × N columns — criteria rows are OR'd; within a row every
//!   non-empty predicate is AND'd
//!
//! A predicate cell is parsed once per lookup: a leading `>=`, `<=`, `>`
//! or `<` compares numerically, anything else matches text
//! case-insensitively, and an empty cell is vacuously true. The source
//! table is never mutated.

use super::math::try_num;
use crate::error::FormulaResult;
use crate::evaluator::{deref_value, EvalCtx, Value};
use crate::resolver::ResolvedCell;
use ahash::AHashMap;
use std::rc::Rc;
use wren_sheets_core::{CellError, CellValue};

/// A parsed database range: labeled columns over value records
#[derive(Debug, Clone, PartialEq)]
pub struct DbTable {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl DbTable {
    /// Parse from a column-major expanded component list. The first cell of
    /// each column is its label; the rest are records.
    pub fn parse(cells: &[ResolvedCell]) -> Option<DbTable> {
        let mut headers: Vec<String> = Vec::new();
        let mut columns: Vec<Vec<CellValue>> = Vec::new();
        let mut prev_col: Option<u16> = None;

        for cell in cells {
            if prev_col != Some(cell.addr.col) {
                prev_col = Some(cell.addr.col);
                headers.push(cell.value.to_string());
                columns.push(Vec::new());
            } else if let Some(column) = columns.last_mut() {
                column.push(cell.value.clone());
            }
        }
        if headers.is_empty() {
            return None;
        }

        let nrows = columns.iter().map(Vec::len).max()?;
        let rows = (0..nrows)
            .map(|r| {
                columns
                    .iter()
                    .map(|c| c.get(r).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Some(DbTable { headers, rows })
    }

    /// Number of fields
    pub fn field_count(&self) -> usize {
        self.headers.len()
    }

    /// Number of records
    pub fn record_count(&self) -> usize {
        self.rows.len()
    }

    /// Records
    pub fn records(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Field labels
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Find a field by label (case-insensitive, trimmed), falling back to
    /// a 1-based positional index
    pub fn find_col(&self, field: &str) -> Option<usize> {
        if let Some(i) = self
            .headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(field.trim()))
        {
            return Some(i);
        }
        let position: usize = field.trim().parse().ok()?;
        if position >= 1 && position <= self.headers.len() {
            Some(position - 1)
        } else {
            None
        }
    }
}

/// One criterion cell, parsed once per lookup
#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    /// Empty cell: vacuously true
    Empty,
    /// Numeric comparison from a leading `>=`, `<=`, `>` or `<`
    Cmp(CmpOp, f64),
    /// Case-insensitive text equality
    Equals(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Predicate {
    fn parse(value: &CellValue) -> Predicate {
        let text = value.to_string();
        let text = text.trim();
        if text.is_empty() {
            return Predicate::Empty;
        }
        let (op, rest) = if let Some(rest) = text.strip_prefix(">=") {
            (Some(CmpOp::Ge), rest)
        } else if let Some(rest) = text.strip_prefix("<=") {
            (Some(CmpOp::Le), rest)
        } else if let Some(rest) = text.strip_prefix('>') {
            (Some(CmpOp::Gt), rest)
        } else if let Some(rest) = text.strip_prefix('<') {
            (Some(CmpOp::Lt), rest)
        } else {
            (None, text)
        };
        match op {
            Some(op) => match rest.trim().parse::<f64>() {
                Ok(n) => Predicate::Cmp(op, n),
                // ">abc" has no numeric operand; nothing will match it
                Err(_) => Predicate::Equals(text.to_lowercase()),
            },
            None => Predicate::Equals(text.to_lowercase()),
        }
    }

    fn matches(&self, value: &CellValue) -> bool {
        match self {
            Predicate::Empty => true,
            Predicate::Cmp(op, operand) => {
                let n = match value {
                    CellValue::Number(n) => *n,
                    CellValue::String(s) => match s.trim().parse::<f64>() {
                        Ok(n) => n,
                        Err(_) => return false,
                    },
                    _ => return false,
                };
                match op {
                    CmpOp::Gt => n > *operand,
                    CmpOp::Ge => n >= *operand,
                    CmpOp::Lt => n < *operand,
                    CmpOp::Le => n <= *operand,
                }
            }
            Predicate::Equals(text) => value.to_string().eq_ignore_ascii_case(text),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Predicate::Empty)
    }
}

/// A parsed criteria range
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaTable {
    headers: Vec<String>,
    rows: Vec<Vec<Predicate>>,
}

impl CriteriaTable {
    /// Parse from a column-major expanded component list
    pub fn parse(cells: &[ResolvedCell]) -> Option<CriteriaTable> {
        let table = DbTable::parse(cells)?;
        let rows = table
            .rows
            .iter()
            .map(|row| row.iter().map(Predicate::parse).collect())
            .collect();
        Some(CriteriaTable {
            headers: table.headers,
            rows,
        })
    }

    /// Whether a database record passes this criteria table
    pub fn passes(&self, record: &[CellValue], db: &DbTable) -> bool {
        let nrows = self.rows.len();
        let ncols = self.headers.len();

        if ncols == 1 {
            // N×1 (and 1×1): OR down the rows of the single column
            self.or_down_single_column(record, db)
        } else if nrows == 1 {
            // 1×N: AND across columns, OR between duplicate field labels
            self.and_across_columns(record, db)
        } else {
            // N×N: rows OR'd, non-empty predicates within a row AND'd
            self.rows_or_columns_and(record, db)
        }
    }

    fn or_down_single_column(&self, record: &[CellValue], db: &DbTable) -> bool {
        let field = match self.headers.first() {
            Some(f) => f,
            None => return false,
        };
        let col = match db.find_col(field) {
            Some(c) => c,
            // a criteria column that names no database field constrains nothing
            None => return true,
        };
        let value = match record.get(col) {
            Some(v) => v,
            None => return false,
        };
        self.rows.iter().any(|row| {
            row.first()
                .map(|p| p.matches(value))
                .unwrap_or(false)
        })
    }

    fn and_across_columns(&self, record: &[CellValue], db: &DbTable) -> bool {
        // group predicates by field label: duplicates are OR'd alternatives
        let mut by_field: Vec<(&str, Vec<&Predicate>)> = Vec::new();
        for (i, field) in self.headers.iter().enumerate() {
            let pred = match self.rows.first().and_then(|row| row.get(i)) {
                Some(p) => p,
                None => continue,
            };
            match by_field
                .iter_mut()
                .find(|(f, _)| f.eq_ignore_ascii_case(field))
            {
                Some((_, preds)) => preds.push(pred),
                None => by_field.push((field.as_str(), vec![pred])),
            }
        }

        for (field, preds) in by_field {
            let col = match db.find_col(field) {
                Some(c) => c,
                None => continue,
            };
            let value = match record.get(col) {
                Some(v) => v,
                None => return false,
            };
            let live: Vec<_> = preds.iter().filter(|p| !p.is_empty()).collect();
            if live.is_empty() {
                continue;
            }
            if !live.iter().any(|p| p.matches(value)) {
                return false;
            }
        }
        true
    }

    fn rows_or_columns_and(&self, record: &[CellValue], db: &DbTable) -> bool {
        'rows: for row in &self.rows {
            for (i, pred) in row.iter().enumerate() {
                if pred.is_empty() {
                    continue;
                }
                let col = match self.headers.get(i).and_then(|f| db.find_col(f)) {
                    Some(c) => c,
                    None => continue,
                };
                let value = match record.get(col) {
                    Some(v) => v,
                    None => continue 'rows,
                };
                if !pred.matches(value) {
                    continue 'rows;
                }
            }
            return true;
        }
        false
    }
}

/// Structural cache key: sheet plus corner coordinates, never display text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableKey {
    sheet: usize,
    start: (u32, u16),
    end: (u32, u16),
}

/// Workbook-scoped cache of parsed database tables
///
/// Invalidated wholesale on any structural edit; correctness never depends
/// on an entry being present.
#[derive(Debug, Default)]
pub struct TableCache {
    tables: AHashMap<TableKey, Rc<DbTable>>,
}

impl TableCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached table
    pub fn invalidate_all(&mut self) {
        self.tables.clear();
    }

    /// Number of cached tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Expand a database/criteria argument; D-functions require range operands
fn db_cells(arg: &Value, ctx: &EvalCtx) -> Result<Vec<ResolvedCell>, CellError> {
    match arg {
        Value::Ranges(ranges) => ctx.resolver().expand_all(ranges),
        Value::Error(e) => Err(*e),
        _ => Err(CellError::Num),
    }
}

fn table_key(cells: &[ResolvedCell]) -> Option<TableKey> {
    let first = cells.first()?;
    if cells.iter().any(|c| c.sheet != first.sheet) {
        return None;
    }
    let start = (
        cells.iter().map(|c| c.addr.row).min()?,
        cells.iter().map(|c| c.addr.col).min()?,
    );
    let end = (
        cells.iter().map(|c| c.addr.row).max()?,
        cells.iter().map(|c| c.addr.col).max()?,
    );
    Some(TableKey {
        sheet: first.sheet,
        start,
        end,
    })
}

/// Fetch a parsed table from the cache, or parse and insert it
fn get_db(arg: &Value, ctx: &EvalCtx) -> Result<Rc<DbTable>, CellError> {
    let cells = db_cells(arg, ctx)?;
    let key = table_key(&cells);
    if let (Some(key), Some(cache)) = (key, ctx.tables) {
        if let Some(table) = cache.borrow().tables.get(&key) {
            return Ok(Rc::clone(table));
        }
    }
    let table = Rc::new(DbTable::parse(&cells).ok_or(CellError::Num)?);
    if let (Some(key), Some(cache)) = (key, ctx.tables) {
        cache
            .borrow_mut()
            .tables
            .insert(key, Rc::clone(&table));
    }
    Ok(table)
}

fn field_column(arg: &Value, ctx: &EvalCtx, db: &DbTable) -> Result<usize, CellError> {
    let field = deref_value(arg.clone(), ctx);
    match &field {
        Value::Number(n) => {
            let position = *n as i64;
            if position >= 1 && (position as usize) <= db.field_count() {
                Ok(position as usize - 1)
            } else {
                Err(CellError::Value)
            }
        }
        Value::Str(s) => db.find_col(s).ok_or(CellError::Value),
        Value::Error(e) => Err(*e),
        _ => Err(CellError::Value),
    }
}

/// Collect the field values of every record matching the criteria
fn matching_values(
    args: &[Value],
    ctx: &EvalCtx,
) -> Result<Vec<CellValue>, CellError> {
    let db = get_db(&args[0], ctx)?;
    let criteria_cells = db_cells(&args[2], ctx)?;
    let criteria = CriteriaTable::parse(&criteria_cells).ok_or(CellError::Num)?;
    let field = field_column(&args[1], ctx, &db)?;

    let mut out = Vec::new();
    for record in db.records() {
        if criteria.passes(record, &db) {
            out.push(record.get(field).cloned().unwrap_or_default());
        }
    }
    Ok(out)
}

fn numeric(values: &[CellValue]) -> Result<Vec<f64>, CellError> {
    let mut out = Vec::new();
    for v in values {
        match v {
            CellValue::Number(n) => out.push(*n),
            CellValue::Error(e) => return Err(*e),
            _ => {}
        }
    }
    Ok(out)
}

fn variance(nums: &[f64], population: bool) -> Result<f64, CellError> {
    let n = nums.len();
    let denominator = if population { n } else { n.saturating_sub(1) };
    if denominator == 0 {
        return Err(CellError::Div0);
    }
    let mean = nums.iter().sum::<f64>() / n as f64;
    let sum_sq = nums.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>();
    Ok(sum_sq / denominator as f64)
}

pub(crate) fn fn_dsum(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(matching_values(args, ctx).and_then(|v| numeric(&v)));
    Ok(Value::Number(nums.iter().sum()))
}

pub(crate) fn fn_daverage(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(matching_values(args, ctx).and_then(|v| numeric(&v)));
    if nums.is_empty() {
        return Ok(Value::Error(CellError::Div0));
    }
    Ok(Value::Number(nums.iter().sum::<f64>() / nums.len() as f64))
}

pub(crate) fn fn_dcount(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(matching_values(args, ctx).and_then(|v| numeric(&v)));
    Ok(Value::Number(nums.len() as f64))
}

pub(crate) fn fn_dcounta(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let values = try_num!(matching_values(args, ctx));
    let count = values.iter().filter(|v| !v.is_empty()).count();
    Ok(Value::Number(count as f64))
}

pub(crate) fn fn_dmin(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(matching_values(args, ctx).and_then(|v| numeric(&v)));
    if nums.is_empty() {
        return Ok(Value::Number(0.0));
    }
    Ok(Value::Number(nums.iter().copied().fold(f64::INFINITY, f64::min)))
}

pub(crate) fn fn_dmax(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(matching_values(args, ctx).and_then(|v| numeric(&v)));
    if nums.is_empty() {
        return Ok(Value::Number(0.0));
    }
    Ok(Value::Number(
        nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    ))
}

pub(crate) fn fn_dproduct(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(matching_values(args, ctx).and_then(|v| numeric(&v)));
    Ok(Value::Number(nums.iter().product()))
}

pub(crate) fn fn_dstdev(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(matching_values(args, ctx).and_then(|v| numeric(&v)));
    let var = try_num!(variance(&nums, false));
    Ok(Value::Number(var.sqrt()))
}

pub(crate) fn fn_dstdevp(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(matching_values(args, ctx).and_then(|v| numeric(&v)));
    let var = try_num!(variance(&nums, true));
    Ok(Value::Number(var.sqrt()))
}

pub(crate) fn fn_dvar(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(matching_values(args, ctx).and_then(|v| numeric(&v)));
    Ok(Value::Number(try_num!(variance(&nums, false))))
}

pub(crate) fn fn_dvarp(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let nums = try_num!(matching_values(args, ctx).and_then(|v| numeric(&v)));
    Ok(Value::Number(try_num!(variance(&nums, true))))
}

/// DGET requires exactly one matching record: none is `#VALUE!`, several
/// are `#NUM!`
pub(crate) fn fn_dget(args: &[Value], ctx: &EvalCtx) -> FormulaResult<Value> {
    let values = try_num!(matching_values(args, ctx));
    match values.len() {
        0 => Ok(Value::Error(CellError::Value)),
        1 => Ok(values.into_iter().next().map(Value::from).unwrap_or(Value::Empty)),
        _ => Ok(Value::Error(CellError::Num)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::calculate;
    use crate::token::{AreaRef, Token};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use wren_sheets_core::{CellAddress, CellRange, Workbook};

    /// Lay out the classic age/height example:
    ///
    /// ```text
    ///      A      B
    /// 1    age    height
    /// 2    23     88
    /// 3    21     99
    /// 4    43     56
    /// 5    23     56
    /// 6    44     76
    /// ```
    fn sample_workbook() -> Workbook {
        let mut wb = Workbook::new();
        let ws = wb.sheet_mut(0).unwrap();
        ws.set_value("A1", "age").unwrap();
        ws.set_value("B1", "height").unwrap();
        for (i, (age, height)) in [(23.0, 88.0), (21.0, 99.0), (43.0, 56.0), (23.0, 56.0), (44.0, 76.0)]
            .iter()
            .enumerate()
        {
            ws.set_value_at(i as u32 + 1, 0, *age).unwrap();
            ws.set_value_at(i as u32 + 1, 1, *height).unwrap();
        }
        wb
    }

    fn range_value(ctx: &EvalCtx, text: &str) -> Value {
        let area = AreaRef::from_range(CellRange::parse(text).unwrap());
        Value::Ranges(ctx.resolver().ranges_of(&Token::Area(area)).unwrap())
    }

    fn set_criteria(wb: &mut Workbook, cells: &[(&str, &str)]) {
        let ws = wb.sheet_mut(0).unwrap();
        for (addr, text) in cells {
            ws.set_value(*addr, *text).unwrap();
        }
    }

    #[test]
    fn test_one_by_two_criteria_is_and() {
        // table [{age:23},{age:44}] with criteria age,>30 matches only 44
        let mut wb = Workbook::new();
        let ws = wb.sheet_mut(0).unwrap();
        ws.set_value("A1", "age").unwrap();
        ws.set_value("A2", 23.0).unwrap();
        ws.set_value("A3", 44.0).unwrap();
        ws.set_value("D1", "age").unwrap();
        ws.set_value("D2", ">30").unwrap();

        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let args = vec![
            range_value(&ctx, "A1:A3"),
            Value::Str("age".into()),
            range_value(&ctx, "D1:D2"),
        ];
        assert_eq!(calculate(40, &args, &ctx).unwrap(), Value::Number(1.0)); // DCOUNT
        assert_eq!(calculate(41, &args, &ctx).unwrap(), Value::Number(44.0)); // DSUM
    }

    #[test]
    fn test_n_by_one_criteria_rows_are_or() {
        // criteria rows '<25' and '>40' OR-match both table rows
        let mut wb = Workbook::new();
        let ws = wb.sheet_mut(0).unwrap();
        ws.set_value("A1", "age").unwrap();
        ws.set_value("A2", 23.0).unwrap();
        ws.set_value("A3", 44.0).unwrap();
        set_criteria(&mut wb, &[("D1", "age"), ("D2", "<25"), ("D3", ">40")]);

        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let args = vec![
            range_value(&ctx, "A1:A3"),
            Value::Str("age".into()),
            range_value(&ctx, "D1:D3"),
        ];
        assert_eq!(calculate(40, &args, &ctx).unwrap(), Value::Number(2.0));
        assert_eq!(calculate(41, &args, &ctx).unwrap(), Value::Number(67.0));
    }

    #[test]
    fn test_one_row_criteria_ands_across_columns() {
        let mut wb = sample_workbook();
        set_criteria(&mut wb, &[("D1", "age"), ("E1", "height"), ("D2", "<29"), ("E2", ">80")]);

        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let args = vec![
            range_value(&ctx, "A1:B6"),
            Value::Str("height".into()),
            range_value(&ctx, "D1:E2"),
        ];
        // rows matching age<29 AND height>80: (23,88) and (21,99)
        assert_eq!(calculate(41, &args, &ctx).unwrap(), Value::Number(187.0));
        assert_eq!(calculate(42, &args, &ctx).unwrap(), Value::Number(93.5)); // DAVERAGE
    }

    #[test]
    fn test_grid_criteria_rows_or_columns_and() {
        let mut wb = sample_workbook();
        // (age<29 AND height>80) OR (age>40 AND height<60)
        set_criteria(
            &mut wb,
            &[
                ("D1", "age"),
                ("E1", "height"),
                ("D2", "<29"),
                ("E2", ">80"),
                ("D3", ">40"),
                ("E3", "<60"),
            ],
        );

        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let args = vec![
            range_value(&ctx, "A1:B6"),
            Value::Str("age".into()),
            range_value(&ctx, "D1:E3"),
        ];
        // matches: (23,88), (21,99), (43,56) — ages 23+21+43
        assert_eq!(calculate(41, &args, &ctx).unwrap(), Value::Number(87.0));
        assert_eq!(calculate(44, &args, &ctx).unwrap(), Value::Number(43.0)); // DMAX
        assert_eq!(calculate(43, &args, &ctx).unwrap(), Value::Number(21.0)); // DMIN
    }

    #[test]
    fn test_empty_predicate_is_vacuously_true() {
        let mut wb = sample_workbook();
        // height column carries no predicate in row 3
        set_criteria(
            &mut wb,
            &[
                ("D1", "age"),
                ("E1", "height"),
                ("D2", "<29"),
                ("E2", ">80"),
                ("D3", ">40"),
            ],
        );
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let args = vec![
            range_value(&ctx, "A1:B6"),
            Value::Str("age".into()),
            range_value(&ctx, "D1:E3"),
        ];
        // second criteria row matches every age>40 regardless of height
        assert_eq!(calculate(40, &args, &ctx).unwrap(), Value::Number(4.0));
    }

    #[test]
    fn test_field_by_position_and_name_case() {
        let wb = sample_workbook();
        let mut wb = wb;
        set_criteria(&mut wb, &[("D1", "AGE"), ("D2", ">30")]);
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let criteria = range_value(&ctx, "D1:D2");
        let db = range_value(&ctx, "A1:B6");

        // field by case-insensitive name
        let by_name = vec![db.clone(), Value::Str("Age".into()), criteria.clone()];
        assert_eq!(calculate(41, &by_name, &ctx).unwrap(), Value::Number(87.0));

        // field by 1-based position
        let by_position = vec![db.clone(), Value::Number(1.0), criteria.clone()];
        assert_eq!(calculate(41, &by_position, &ctx).unwrap(), Value::Number(87.0));

        // unknown field
        let bad = vec![db, Value::Str("nope".into()), criteria];
        assert_eq!(
            calculate(41, &bad, &ctx).unwrap(),
            Value::Error(CellError::Value)
        );
    }

    #[test]
    fn test_dget_cardinality() {
        let mut wb = sample_workbook();
        set_criteria(&mut wb, &[("D1", "age"), ("D2", ">42")]);
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let db = range_value(&ctx, "A1:B6");
        let criteria = range_value(&ctx, "D1:D2");

        // ages > 42: 43 and 44 — two matches
        let two = vec![db.clone(), Value::Str("age".into()), criteria];
        assert_eq!(
            calculate(235, &two, &ctx).unwrap(),
            Value::Error(CellError::Num)
        );

        set_criteria(&mut wb, &[("D2", ">43")]);
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let one = vec![
            range_value(&ctx, "A1:B6"),
            Value::Str("age".into()),
            range_value(&ctx, "D1:D2"),
        ];
        assert_eq!(calculate(235, &one, &ctx).unwrap(), Value::Number(44.0));

        set_criteria(&mut wb, &[("D2", ">99")]);
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let none = vec![
            range_value(&ctx, "A1:B6"),
            Value::Str("age".into()),
            range_value(&ctx, "D1:D2"),
        ];
        assert_eq!(
            calculate(235, &none, &ctx).unwrap(),
            Value::Error(CellError::Value)
        );
    }

    #[test]
    fn test_statistical_dfunctions() {
        let mut wb = sample_workbook();
        set_criteria(&mut wb, &[("D1", "age"), ("D2", "23")]);
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let args = vec![
            range_value(&ctx, "A1:B6"),
            Value::Str("height".into()),
            range_value(&ctx, "D1:D2"),
        ];
        // heights where age == 23: 88 and 56
        assert_eq!(calculate(189, &args, &ctx).unwrap(), Value::Number(4928.0)); // DPRODUCT
        assert_eq!(calculate(196, &args, &ctx).unwrap(), Value::Number(256.0)); // DVARP
        assert_eq!(calculate(195, &args, &ctx).unwrap(), Value::Number(16.0)); // DSTDEVP
        assert_eq!(calculate(47, &args, &ctx).unwrap(), Value::Number(512.0)); // DVAR
        assert_eq!(calculate(199, &args, &ctx).unwrap(), Value::Number(2.0)); // DCOUNTA
    }

    #[test]
    fn test_non_range_operand_is_num_error() {
        let wb = Workbook::new();
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
        let args = vec![
            Value::Number(1.0),
            Value::Str("age".into()),
            Value::Number(2.0),
        ];
        assert_eq!(
            calculate(41, &args, &ctx).unwrap(),
            Value::Error(CellError::Num)
        );
    }

    #[test]
    fn test_table_cache_is_structural_and_invalidatable() {
        let mut wb = sample_workbook();
        set_criteria(&mut wb, &[("D1", "age"), ("D2", ">30")]);
        let cache = RefCell::new(TableCache::new());
        let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0)).with_tables(&cache);
        let args = vec![
            range_value(&ctx, "A1:B6"),
            Value::Str("age".into()),
            range_value(&ctx, "D1:D2"),
        ];
        assert_eq!(calculate(41, &args, &ctx).unwrap(), Value::Number(87.0));
        assert_eq!(cache.borrow().len(), 1);

        // repeated query hits the same structural key
        assert_eq!(calculate(41, &args, &ctx).unwrap(), Value::Number(87.0));
        assert_eq!(cache.borrow().len(), 1);

        cache.borrow_mut().invalidate_all();
        assert!(cache.borrow().is_empty());
        assert_eq!(calculate(41, &args, &ctx).unwrap(), Value::Number(87.0));
    }
}
