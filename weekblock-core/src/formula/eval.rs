//! Formula interpreter

use super::{BinaryOp, Expr, Value};
use crate::grid::LedgerGrid;
use crate::reader::workbook::{CellValue, Formula, date_to_serial};
use std::cmp::Ordering;

/// Formula chains deeper than this are treated as circular
const MAX_DEPTH: usize = 64;

/// Evaluate the cell at `(row, col)`, following formula references
pub fn evaluate_cell(grid: &dyn LedgerGrid, row: u32, col: u32) -> Value {
    Evaluator::new(grid).cell(row, col)
}

/// Evaluates expressions against a grid
pub struct Evaluator<'a> {
    grid: &'a dyn LedgerGrid,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(grid: &'a dyn LedgerGrid) -> Self {
        Self { grid, depth: 0 }
    }

    /// Value of a stored cell
    pub fn cell(&mut self, row: u32, col: u32) -> Value {
        match self.grid.value(row, col) {
            CellValue::Empty => Value::Empty,
            CellValue::Number(n) => Value::Number(n),
            CellValue::Text(s) => Value::Text(s),
            CellValue::Boolean(b) => Value::Bool(b),
            CellValue::Date(d) => Value::Number(date_to_serial(d)),
            CellValue::Formula(Formula::Opaque { cached, .. }) => cached,
            CellValue::Formula(Formula::Parsed(expr)) => {
                if self.depth >= MAX_DEPTH {
                    return Value::Error("#REF!".to_string());
                }
                self.depth += 1;
                let value = self.eval(&expr, row, col);
                self.depth -= 1;
                value
            }
        }
    }

    /// Evaluate `expr` as if it were written in the cell at `(row, col)`
    pub fn eval(&mut self, expr: &Expr, row: u32, col: u32) -> Value {
        match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Text(s) => Value::Text(s.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Ref(cell) => match cell.resolve(row, col) {
                Some((r, c)) => self.cell(r, c),
                None => Value::Error("#REF!".to_string()),
            },
            Expr::Neg(inner) => match to_number(&self.eval(inner, row, col)) {
                Ok(n) => Value::Number(-n),
                Err(e) => e,
            },
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, row, col);
                if left.is_error() {
                    return left;
                }
                let right = self.eval(right, row, col);
                if right.is_error() {
                    return right;
                }
                binary(*op, &left, &right)
            }
            Expr::Call { name, args } => self.call(name, args, row, col),
        }
    }

    fn call(&mut self, name: &str, args: &[Expr], row: u32, col: u32) -> Value {
        match name {
            "IF" => {
                if !(2..=3).contains(&args.len()) {
                    return Value::Error("#N/A".to_string());
                }
                match truthy(&self.eval(&args[0], row, col)) {
                    Ok(true) => self.eval(&args[1], row, col),
                    Ok(false) => match args.get(2) {
                        Some(otherwise) => self.eval(otherwise, row, col),
                        None => Value::Bool(false),
                    },
                    Err(e) => e,
                }
            }
            "OR" | "AND" => {
                if args.is_empty() {
                    return Value::Error("#N/A".to_string());
                }
                let is_or = name == "OR";
                let mut result = !is_or;
                for arg in args {
                    let value = self.eval(arg, row, col);
                    if matches!(value, Value::Empty) {
                        continue;
                    }
                    match truthy(&value) {
                        Ok(b) if is_or => result |= b,
                        Ok(b) => result &= b,
                        Err(e) => return e,
                    }
                }
                Value::Bool(result)
            }
            "NOT" => {
                if args.len() != 1 {
                    return Value::Error("#N/A".to_string());
                }
                match truthy(&self.eval(&args[0], row, col)) {
                    Ok(b) => Value::Bool(!b),
                    Err(e) => e,
                }
            }
            "ISBLANK" => {
                if args.len() != 1 {
                    return Value::Error("#N/A".to_string());
                }
                Value::Bool(matches!(self.eval(&args[0], row, col), Value::Empty))
            }
            _ => Value::Error("#NAME?".to_string()),
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            let (l, r) = match (to_number(left), to_number(right)) {
                (Ok(l), Ok(r)) => (l, r),
                (Err(e), _) | (_, Err(e)) => return e,
            };
            match op {
                BinaryOp::Add => Value::Number(l + r),
                BinaryOp::Sub => Value::Number(l - r),
                BinaryOp::Mul => Value::Number(l * r),
                _ if r == 0.0 => Value::Error("#DIV/0!".to_string()),
                _ => Value::Number(l / r),
            }
        }
        BinaryOp::Concat => Value::Text(format!("{}{}", left, right)),
        _ => {
            let ordering = compare(left, right);
            Value::Bool(match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Ne => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

fn to_number(value: &Value) -> Result<f64, Value> {
    match value {
        Value::Empty => Ok(0.0),
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Value::Error("#VALUE!".to_string())),
        Value::Error(_) => Err(value.clone()),
    }
}

fn truthy(value: &Value) -> Result<bool, Value> {
    match value {
        Value::Empty => Ok(false),
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(*n != 0.0),
        Value::Text(s) if s.eq_ignore_ascii_case("TRUE") => Ok(true),
        Value::Text(s) if s.eq_ignore_ascii_case("FALSE") => Ok(false),
        Value::Text(_) => Err(Value::Error("#VALUE!".to_string())),
        Value::Error(_) => Err(value.clone()),
    }
}

/// Blank takes the shape of the other operand: "" for text, 0 for numbers, FALSE for booleans
fn compare(left: &Value, right: &Value) -> Ordering {
    let coerce = |blank: &Value, other: &Value| match other {
        Value::Text(_) => Value::Text(String::new()),
        Value::Number(_) => Value::Number(0.0),
        Value::Bool(_) => Value::Bool(false),
        _ => blank.clone(),
    };
    let left = match left {
        Value::Empty => coerce(left, right),
        _ => left.clone(),
    };
    let right = match right {
        Value::Empty => coerce(right, &left),
        _ => right.clone(),
    };

    let rank = |v: &Value| match v {
        Value::Empty => 0,
        Value::Number(_) => 1,
        Value::Text(_) => 2,
        Value::Bool(_) => 3,
        Value::Error(_) => 4,
    };

    match (&left, &right) {
        (Value::Number(l), Value::Number(r)) => l.partial_cmp(r).unwrap_or(Ordering::Equal),
        (Value::Text(l), Value::Text(r)) => l.to_lowercase().cmp(&r.to_lowercase()),
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        _ => rank(&left).cmp(&rank(&right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse_r1c1;
    use crate::reader::workbook::Sheet;

    fn sheet_with(cells: &[(u32, u32, CellValue)]) -> Sheet {
        let mut sheet = Sheet::new("Test".to_string());
        for (row, col, value) in cells {
            sheet.put(*row, *col, value.clone());
        }
        sheet
    }

    fn eval_at(sheet: &Sheet, formula: &str, row: u32, col: u32) -> Value {
        let expr = parse_r1c1(formula).unwrap();
        Evaluator::new(sheet).eval(&expr, row, col)
    }

    #[test]
    fn test_blank_comparisons() {
        let sheet = sheet_with(&[(1, 2, CellValue::Number(0.0))]);
        assert_eq!(eval_at(&sheet, "=RC[-1]=\"\"", 1, 2), Value::Bool(true));
        assert_eq!(eval_at(&sheet, "=RC[-1]=0", 1, 2), Value::Bool(true));
        assert_eq!(eval_at(&sheet, "=RC=\"\"", 1, 2), Value::Bool(false));
        assert_eq!(eval_at(&sheet, "=RC<>\"\"", 1, 2), Value::Bool(true));
    }

    #[test]
    fn test_text_comparison_is_case_insensitive() {
        let sheet = sheet_with(&[(1, 1, CellValue::Text("Total".into()))]);
        assert_eq!(eval_at(&sheet, "=RC1=\"TOTAL\"", 1, 3), Value::Bool(true));
        assert_eq!(eval_at(&sheet, "=\"a\"<\"B\"", 1, 1), Value::Bool(true));
    }

    #[test]
    fn test_arithmetic_and_errors() {
        let sheet = sheet_with(&[
            (2, 1, CellValue::Number(8.0)),
            (2, 2, CellValue::Text("x".into())),
            (2, 3, CellValue::Text(" 4 ".into())),
        ]);
        assert_eq!(eval_at(&sheet, "=RC1-10", 2, 5), Value::Number(-2.0));
        assert_eq!(eval_at(&sheet, "=RC3*2", 2, 5), Value::Number(8.0));
        assert_eq!(
            eval_at(&sheet, "=RC2+1", 2, 5),
            Value::Error("#VALUE!".into())
        );
        assert_eq!(
            eval_at(&sheet, "=RC1/0", 2, 5),
            Value::Error("#DIV/0!".into())
        );
        assert_eq!(
            eval_at(&sheet, "=RC[-9]", 2, 5),
            Value::Error("#REF!".into())
        );
        assert_eq!(
            eval_at(&sheet, "=FOO(1)", 2, 5),
            Value::Error("#NAME?".into())
        );
    }

    #[test]
    fn test_logical_functions() {
        let sheet = sheet_with(&[(1, 1, CellValue::Boolean(true))]);
        assert_eq!(eval_at(&sheet, "=IF(RC1,1,2)", 1, 2), Value::Number(1.0));
        assert_eq!(eval_at(&sheet, "=IF(NOT(RC1),1)", 1, 2), Value::Bool(false));
        assert_eq!(eval_at(&sheet, "=OR(FALSE,RC1)", 1, 2), Value::Bool(true));
        assert_eq!(eval_at(&sheet, "=AND(TRUE,RC[5])", 1, 2), Value::Bool(true));
        assert_eq!(eval_at(&sheet, "=ISBLANK(RC[1])", 1, 2), Value::Bool(true));
        assert_eq!(eval_at(&sheet, "=ISBLANK(\"\")", 1, 2), Value::Bool(false));
        assert_eq!(
            eval_at(&sheet, "=IF(\"maybe\",1,2)", 1, 2),
            Value::Error("#VALUE!".into())
        );
    }

    #[test]
    fn test_formula_chains_and_cycles() {
        let chained = parse_r1c1("=RC[-1]+1").unwrap();
        let sheet = sheet_with(&[
            (1, 1, CellValue::Number(1.0)),
            (1, 2, CellValue::Formula(Formula::Parsed(chained.clone()))),
            (1, 3, CellValue::Formula(Formula::Parsed(chained))),
        ]);
        assert_eq!(evaluate_cell(&sheet, 1, 3), Value::Number(3.0));

        let looped = parse_r1c1("=RC+1").unwrap();
        let sheet = sheet_with(&[(1, 1, CellValue::Formula(Formula::Parsed(looped)))]);
        assert_eq!(evaluate_cell(&sheet, 1, 1), Value::Error("#REF!".into()));
    }

    #[test]
    fn test_opaque_formula_uses_cached_value() {
        let sheet = sheet_with(&[(
            1,
            1,
            CellValue::Formula(Formula::Opaque {
                text: "SUM(B1:B9)".into(),
                cached: Value::Number(42.0),
            }),
        )]);
        assert_eq!(evaluate_cell(&sheet, 1, 1), Value::Number(42.0));
    }
}
