//! End-to-end pipeline tests: stored bytes → tokens → resolved references
//! → evaluated result against worksheet data.

use pretty_assertions::assert_eq;
use wren_sheets_core::{CellAddress, CellError, CellRange, CellValue, SheetSpan, Workbook};
use wren_sheets_formula::biff::decode_tokens;
use wren_sheets_formula::evaluator::{evaluate_tokens, EvalCtx, Value};
use wren_sheets_formula::{encode_tokens, AreaRef, CellRef, Engine, Token};

fn eval_bytes(wb: &Workbook, rgce: &[u8], rgcb: &[u8]) -> Value {
    let tokens = decode_tokens(rgce, rgcb).unwrap();
    let ctx = EvalCtx::new(wb, 0, CellAddress::new(0, 0));
    evaluate_tokens(&tokens, &ctx).unwrap()
}

#[test]
fn sum_over_area_from_raw_bytes() {
    let mut wb = Workbook::new();
    let ws = wb.sheet_mut(0).unwrap();
    for (addr, v) in [("B2", 1.0), ("B3", 2.0), ("B4", 3.0), ("C2", 4.0), ("C3", 5.0), ("C4", 6.0)] {
        ws.set_value(addr, v).unwrap();
    }

    // =SUM(B2:C4): tArea(B2:C4) then tFuncVar(argc=1, iftab=4)
    let rgce = [
        0x45, // PtgArea, VALUE class
        0x01, 0x00, // first row 1
        0x03, 0x00, // last row 3
        0x01, 0xC0, // first col 1, both axes relative
        0x02, 0xC0, // last col 2
        0x42, 0x01, 0x04, 0x00, // PtgFuncVar, 1 arg, iftab 4 (SUM)
    ];
    assert_eq!(eval_bytes(&wb, &rgce, &[]), Value::Number(21.0));
}

#[test]
fn error_cell_propagates_through_sum() {
    let mut wb = Workbook::new();
    let ws = wb.sheet_mut(0).unwrap();
    ws.set_value("A1", 1.0).unwrap();
    ws.set_value("A2", CellError::Div0).unwrap();
    ws.set_value("A3", 2.0).unwrap();

    // =SUM(A1:A3)
    let rgce = [
        0x45, 0x00, 0x00, 0x02, 0x00, 0x00, 0xC0, 0x00, 0xC0, // A1:A3
        0x42, 0x01, 0x04, 0x00,
    ];
    assert_eq!(eval_bytes(&wb, &rgce, &[]), Value::Error(CellError::Div0));
}

#[test]
fn three_d_sum_across_sheets() {
    let mut wb = Workbook::new();
    wb.add_sheet("Q2").unwrap();
    wb.add_sheet("Q3").unwrap();
    for i in 0..3 {
        wb.sheet_mut(i).unwrap().set_value("A1", (i + 1) as f64).unwrap();
    }
    let ixti = wb.add_sheet_span(SheetSpan { first: 0, last: 2 });
    assert_eq!(ixti, 0);

    // =SUM(Sheet1:Q3!A1): tRef3d(ixti=0, A1) + tFuncVar SUM
    let rgce = [
        0x5A, // PtgRef3d, VALUE class
        0x00, 0x00, // ixti 0
        0x00, 0x00, // row 0
        0x00, 0xC0, // col 0, relative
        0x42, 0x01, 0x04, 0x00,
    ];
    assert_eq!(eval_bytes(&wb, &rgce, &[]), Value::Number(6.0));
}

#[test]
fn deleted_sheet_reference_yields_ref_error() {
    let mut wb = Workbook::new();
    wb.add_sheet_span(SheetSpan {
        first: wren_sheets_core::DELETED_SHEET,
        last: wren_sheets_core::DELETED_SHEET,
    });
    // bare =Sheet?!A1 with the deleted span dereferences to #REF!
    let rgce = [0x5A, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0];
    let tokens = decode_tokens(&rgce, &[]).unwrap();
    let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
    let v = evaluate_tokens(&tokens, &ctx).unwrap();
    assert_eq!(v, Value::Error(CellError::Ref));
}

#[test]
fn array_constant_feeds_sum() {
    // =SUM({1,2;3,4})
    let tokens = vec![
        Token::Array(
            wren_sheets_formula::ArrayLiteral::new(vec![
                vec![
                    wren_sheets_formula::ArrayValue::Number(1.0),
                    wren_sheets_formula::ArrayValue::Number(2.0),
                ],
                vec![
                    wren_sheets_formula::ArrayValue::Number(3.0),
                    wren_sheets_formula::ArrayValue::Number(4.0),
                ],
            ])
            .unwrap(),
        ),
        Token::FuncVar { iftab: 4, argc: 1 },
    ];
    // push the literal through its stored form first
    let enc = encode_tokens(&tokens);
    let wb = Workbook::new();
    assert_eq!(eval_bytes(&wb, &enc.rgce, &enc.rgcb), Value::Number(10.0));
}

#[test]
fn defined_name_resolves_through_name_token() {
    let mut wb = Workbook::new();
    let ws = wb.sheet_mut(0).unwrap();
    ws.set_value("A1", 2.0).unwrap();
    ws.set_value("A2", 3.0).unwrap();
    let index = wb
        .define_name("Data", None, 0, CellRange::parse("A1:A2").unwrap())
        .unwrap();

    let tokens = vec![
        Token::Name { index },
        Token::FuncVar { iftab: 4, argc: 1 },
    ];
    let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
    assert_eq!(evaluate_tokens(&tokens, &ctx).unwrap(), Value::Number(5.0));
}

#[test]
fn isna_sees_only_na() {
    let mut wb = Workbook::new();
    let ws = wb.sheet_mut(0).unwrap();
    ws.set_value("A1", CellError::Na).unwrap();
    ws.set_value("A2", CellError::Value).unwrap();

    let isna_of = |row: u16| {
        vec![
            Token::Ref(CellRef::new(row, 0)),
            Token::FuncVar { iftab: 2, argc: 1 },
        ]
    };
    let ctx = EvalCtx::new(&wb, 0, CellAddress::new(0, 0));
    assert_eq!(evaluate_tokens(&isna_of(0), &ctx).unwrap(), Value::Bool(true));
    assert_eq!(evaluate_tokens(&isna_of(1), &ctx).unwrap(), Value::Bool(false));
}

#[test]
fn recalculation_follows_dependency_chain_from_bytes() {
    let mut wb = Workbook::new();
    wb.sheet_mut(0).unwrap().set_value("A1", 10.0).unwrap();

    // B1 = A1*2, encoded and decoded before installation
    let b1 = encode_tokens(&[
        Token::Ref(CellRef::new(0, 0)),
        Token::Number(2.0),
        Token::Mul,
    ]);
    // C1 = B1+5
    let c1 = encode_tokens(&[
        Token::Ref(CellRef::new(0, 1)),
        Token::Number(5.0),
        Token::Add,
    ]);

    let mut engine = Engine::new();
    engine
        .set_formula(&wb, 0, 0, 2, decode_tokens(&c1.rgce, &c1.rgcb).unwrap())
        .unwrap();
    engine
        .set_formula(&wb, 0, 0, 1, decode_tokens(&b1.rgce, &b1.rgcb).unwrap())
        .unwrap();

    let results = engine.recalculate(&mut wb);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(wb.sheet(0).unwrap().value_at(0, 1), CellValue::Number(20.0));
    assert_eq!(wb.sheet(0).unwrap().value_at(0, 2), CellValue::Number(25.0));
}

#[test]
fn memfunc_union_through_dsum_style_expansion() {
    // exercise a decoded MemFunc as a function argument: =SUM((A1:A2,C1))
    let mut wb = Workbook::new();
    let ws = wb.sheet_mut(0).unwrap();
    ws.set_value("A1", 1.0).unwrap();
    ws.set_value("A2", 2.0).unwrap();
    ws.set_value("C1", 4.0).unwrap();

    let memfunc = Token::MemFunc(vec![
        Token::Area(AreaRef::new(CellRef::new(0, 0), CellRef::new(1, 0))),
        Token::Ref(CellRef::new(0, 2)),
        Token::Union,
    ]);
    let enc = encode_tokens(&[memfunc, Token::FuncVar { iftab: 4, argc: 1 }]);
    assert_eq!(eval_bytes(&wb, &enc.rgce, &enc.rgcb), Value::Number(7.0));
}
