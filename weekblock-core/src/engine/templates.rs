//! Relative formula templates written into every block

use crate::formula::{BinaryOp, CellRef, Expr};

/// Column holding the item name; a row without one gets no planned count
pub const ITEM_COLUMN: u32 = 1;

/// Planned count template, as the host shows it in R1C1 notation
pub const PLANNED_COUNT_R1C1: &str =
    r#"=IF(RC1="","",IF(RC[-3]<>"",RC[-3],IF(RC[-4]<>"",RC[-4],"")))"#;

/// Delta template, as the host shows it in R1C1 notation
pub const DELTA_R1C1: &str = r#"=IF(OR(RC[-1]="",RC[-2]=""),"",RC[-1]-RC[-2])"#;

fn same_row(col_offset: i32) -> Expr {
    Expr::reference(CellRef::relative(0, col_offset))
}

fn if_(condition: Expr, then: Expr, otherwise: Expr) -> Expr {
    Expr::call("IF", vec![condition, then, otherwise])
}

fn is_blank(expr: Expr) -> Expr {
    Expr::binary(BinaryOp::Eq, expr, Expr::blank())
}

fn not_blank(expr: Expr) -> Expr {
    Expr::binary(BinaryOp::Ne, expr, Expr::blank())
}

/// Planned count for the first sub-column of a block
///
/// Carries the previous block's actual count forward, or its planned count
/// when nothing was counted, and stays blank on rows without an item.
pub fn planned_count() -> Expr {
    let previous_actual = same_row(-3);
    let previous_planned = same_row(-4);
    if_(
        is_blank(Expr::reference(CellRef::fixed_column(ITEM_COLUMN))),
        Expr::blank(),
        if_(
            not_blank(previous_actual.clone()),
            previous_actual,
            if_(not_blank(previous_planned.clone()), previous_planned, Expr::blank()),
        ),
    )
}

/// Actual minus planned, blank unless both are present
pub fn delta() -> Expr {
    let actual = same_row(-1);
    let planned = same_row(-2);
    if_(
        Expr::call("OR", vec![is_blank(actual.clone()), is_blank(planned.clone())]),
        Expr::blank(),
        Expr::binary(BinaryOp::Sub, actual, planned),
    )
}
