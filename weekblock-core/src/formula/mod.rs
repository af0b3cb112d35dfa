//! Relative formula templates
//!
//! A formula is stored as an expression tree whose references are expressed
//! either as absolute coordinates or as offsets from the cell that evaluates
//! them. The same tree therefore means "the cell three columns to my left" no
//! matter which cell it is assigned to, which is what lets one template be
//! written over a whole column range and re-target itself per cell.

mod eval;
mod parser;

pub use eval::{Evaluator, evaluate_cell};
pub use parser::{parse_a1, parse_r1c1};

use crate::error::{LedgerError, Result};
use serde::Serialize;
use std::fmt;

/// One axis of a cell reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coord {
    /// Fixed 1-based row or column (`R3`, `C1`, `$A`, `$3`)
    Absolute(u32),
    /// Offset from the evaluating cell (`R[-1]`, `C`, `A` written without `$`)
    Offset(i32),
}

impl Coord {
    /// Resolve against the evaluating cell's row or column
    pub fn resolve(&self, origin: u32) -> Option<u32> {
        match *self {
            Coord::Absolute(index) => (index >= 1).then_some(index),
            Coord::Offset(delta) => {
                let index = i64::from(origin) + i64::from(delta);
                (index >= 1 && index <= i64::from(u32::MAX)).then_some(index as u32)
            }
        }
    }

    fn fmt_r1c1(&self, out: &mut String, axis: char) {
        out.push(axis);
        match *self {
            Coord::Absolute(index) => out.push_str(&index.to_string()),
            Coord::Offset(0) => {}
            Coord::Offset(delta) => {
                out.push('[');
                out.push_str(&delta.to_string());
                out.push(']');
            }
        }
    }
}

/// A reference to a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub row: Coord,
    pub col: Coord,
}

impl CellRef {
    /// Same-row style reference: offsets on both axes
    pub fn relative(row_offset: i32, col_offset: i32) -> Self {
        Self {
            row: Coord::Offset(row_offset),
            col: Coord::Offset(col_offset),
        }
    }

    /// Current row, fixed column (`RC1`)
    pub fn fixed_column(col: u32) -> Self {
        Self {
            row: Coord::Offset(0),
            col: Coord::Absolute(col),
        }
    }

    pub fn resolve(&self, row: u32, col: u32) -> Option<(u32, u32)> {
        Some((self.row.resolve(row)?, self.col.resolve(col)?))
    }

    fn fmt_a1(&self, out: &mut String, row: u32, col: u32) -> Result<()> {
        let (target_row, target_col) = self
            .resolve(row, col)
            .ok_or(LedgerError::ReferenceOutOfSheet { row, col })?;
        if matches!(self.col, Coord::Absolute(_)) {
            out.push('$');
        }
        out.push_str(&column_letters(target_col));
        if matches!(self.row, Coord::Absolute(_)) {
            out.push('$');
        }
        out.push_str(&target_row.to_string());
        Ok(())
    }
}

/// Binary operators in ascending precedence groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Concat => "&",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 1,
            BinaryOp::Concat => 2,
            BinaryOp::Add | BinaryOp::Sub => 3,
            BinaryOp::Mul | BinaryOp::Div => 4,
        }
    }
}

/// Formula expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    Ref(CellRef),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

/// How references are written when rendering
#[derive(Debug, Clone, Copy)]
enum RefStyle {
    R1C1,
    A1 { row: u32, col: u32 },
}

impl Expr {
    pub fn text(value: impl Into<String>) -> Self {
        Expr::Text(value.into())
    }

    /// The empty string literal `""`
    pub fn blank() -> Self {
        Expr::Text(String::new())
    }

    pub fn reference(cell: CellRef) -> Self {
        Expr::Ref(cell)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.to_ascii_uppercase(),
            args,
        }
    }

    /// Render in R1C1 notation, without the leading `=`
    pub fn to_r1c1(&self) -> String {
        let mut out = String::new();
        // R1C1 rendering never resolves references, so it cannot fail
        let _ = self.render(&mut out, RefStyle::R1C1);
        out
    }

    /// Render in A1 notation as seen from `(row, col)`, without the leading `=`
    pub fn to_a1(&self, row: u32, col: u32) -> Result<String> {
        let mut out = String::new();
        self.render(&mut out, RefStyle::A1 { row, col })?;
        Ok(out)
    }

    /// Every cell reference in the tree, in reading order
    pub fn references(&self) -> Vec<CellRef> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs(&self, refs: &mut Vec<CellRef>) {
        match self {
            Expr::Ref(cell) => refs.push(*cell),
            Expr::Neg(inner) => inner.collect_refs(refs),
            Expr::Binary { left, right, .. } => {
                left.collect_refs(refs);
                right.collect_refs(refs);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_refs(refs)),
            Expr::Number(_) | Expr::Text(_) | Expr::Bool(_) => {}
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Neg(_) => 5,
            _ => 6,
        }
    }

    fn render(&self, out: &mut String, style: RefStyle) -> Result<()> {
        match self {
            Expr::Number(n) => out.push_str(&format_number(*n)),
            Expr::Text(s) => {
                out.push('"');
                out.push_str(&s.replace('"', "\"\""));
                out.push('"');
            }
            Expr::Bool(b) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
            Expr::Ref(cell) => match style {
                RefStyle::R1C1 => {
                    cell.row.fmt_r1c1(out, 'R');
                    cell.col.fmt_r1c1(out, 'C');
                }
                RefStyle::A1 { row, col } => cell.fmt_a1(out, row, col)?,
            },
            Expr::Neg(inner) => {
                out.push('-');
                inner.render_operand(out, style, self.precedence())?;
            }
            Expr::Binary { op, left, right } => {
                let precedence = op.precedence();
                left.render_operand(out, style, precedence)?;
                out.push_str(op.symbol());
                // Left-associative: an equal-precedence right operand needs parentheses
                right.render_operand(out, style, precedence + 1)?;
            }
            Expr::Call { name, args } => {
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    arg.render(out, style)?;
                }
                out.push(')');
            }
        }
        Ok(())
    }

    fn render_operand(&self, out: &mut String, style: RefStyle, min_precedence: u8) -> Result<()> {
        if self.precedence() < min_precedence {
            out.push('(');
            self.render(out, style)?;
            out.push(')');
            Ok(())
        } else {
            self.render(out, style)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "={}", self.to_r1c1())
    }
}

/// Result of evaluating a formula or reading a cell
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(String),
}

impl Value {
    /// Blank cell or empty string, the two things a sheet displays as nothing
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Error(e) => write!(f, "{}", e),
        }
    }
}

/// Format a number the way a formula bar shows it
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Convert a 1-based column index to letters (1 -> A, 27 -> AA)
pub fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Convert column letters to a 1-based index (A -> 1, AA -> 27)
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut col = 0u32;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col
            .checked_mul(26)?
            .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    Some(col)
}
