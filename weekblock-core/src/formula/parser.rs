//! Formula text parser for R1C1 and A1 notation

use super::{BinaryOp, CellRef, Coord, Expr, column_index};
use crate::error::{LedgerError, Result};

/// Parse R1C1 formula text (`=IF(RC1="","",RC[-3])`)
pub fn parse_r1c1(text: &str) -> Result<Expr> {
    Parser::new(text, Notation::R1C1)?.parse()
}

/// Parse A1 formula text as written in the cell at `(row, col)`
///
/// Unanchored references become offsets from that cell, so the resulting
/// tree is the same one `parse_r1c1` produces for the equivalent template.
pub fn parse_a1(text: &str, row: u32, col: u32) -> Result<Expr> {
    Parser::new(text, Notation::A1 { row, col })?.parse()
}

#[derive(Debug, Clone, Copy)]
enum Notation {
    R1C1,
    A1 { row: u32, col: u32 },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Ref(CellRef),
    Op(BinaryOp),
    LParen,
    RParen,
    Comma,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    notation: Notation,
}

impl Lexer {
    fn new(source: &str, notation: Notation) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            notation,
        }
    }

    fn error(&self, message: impl Into<String>) -> LedgerError {
        LedgerError::FormulaParse {
            message: message.into(),
            position: self.pos,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn tokens(mut self) -> Result<Vec<(Token, usize)>> {
        let mut tokens = Vec::new();
        while let Some(ch) = self.peek() {
            let start = self.pos;
            if ch.is_whitespace() {
                self.pos += 1;
                continue;
            }
            let token = match ch {
                '(' => {
                    self.pos += 1;
                    Token::LParen
                }
                ')' => {
                    self.pos += 1;
                    Token::RParen
                }
                ',' => {
                    self.pos += 1;
                    Token::Comma
                }
                '+' => self.op(BinaryOp::Add, 1),
                '-' => self.op(BinaryOp::Sub, 1),
                '*' => self.op(BinaryOp::Mul, 1),
                '/' => self.op(BinaryOp::Div, 1),
                '&' => self.op(BinaryOp::Concat, 1),
                '=' => self.op(BinaryOp::Eq, 1),
                '<' => match self.peek_at(1) {
                    Some('>') => self.op(BinaryOp::Ne, 2),
                    Some('=') => self.op(BinaryOp::Le, 2),
                    _ => self.op(BinaryOp::Lt, 1),
                },
                '>' => match self.peek_at(1) {
                    Some('=') => self.op(BinaryOp::Ge, 2),
                    _ => self.op(BinaryOp::Gt, 1),
                },
                '"' => self.string()?,
                c if c.is_ascii_digit() || c == '.' => self.number()?,
                c if c.is_alphabetic() || c == '$' || c == '_' => self.word()?,
                other => return Err(self.error(format!("unexpected character '{}'", other))),
            };
            tokens.push((token, start));
        }
        Ok(tokens)
    }

    fn op(&mut self, op: BinaryOp, width: usize) -> Token {
        self.pos += width;
        Token::Op(op)
    }

    fn string(&mut self) -> Result<Token> {
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek() {
                Some('"') if self.peek_at(1) == Some('"') => {
                    text.push('"');
                    self.pos += 2;
                }
                Some('"') => {
                    self.pos += 1;
                    return Ok(Token::Text(text));
                }
                Some(ch) => {
                    text.push(ch);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated string literal")),
            }
        }
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            let exponent_sign = (ch == '+' || ch == '-')
                && matches!(self.chars.get(self.pos.wrapping_sub(1)), Some('e' | 'E'));
            if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error(format!("invalid number '{}'", literal)))
    }

    fn word(&mut self) -> Result<Token> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || matches!(ch, '$' | '_' | '.' | '[' | ']' | '-') {
                // '[', ']' and '-' only belong to a word inside R1C1 brackets
                if matches!(ch, '[' | ']' | '-') && !self.inside_r1c1_bracket(start) {
                    break;
                }
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        let is_call = self.next_non_space() == Some('(');

        if !is_call {
            let reference = match self.notation {
                Notation::R1C1 => parse_r1c1_ref(&word),
                Notation::A1 { row, col } => parse_a1_ref(&word, row, col),
            };
            if let Some(cell) = reference {
                return Ok(Token::Ref(cell));
            }
        }

        if word.contains(['$', '[', ']']) {
            return Err(LedgerError::FormulaParse {
                message: format!("invalid reference '{}'", word),
                position: start,
            });
        }
        Ok(Token::Ident(word.to_ascii_uppercase()))
    }

    /// Whether the cursor sits in an `R[..]` / `C[..]` bracket, or is about to open one
    fn inside_r1c1_bracket(&self, start: usize) -> bool {
        if !matches!(self.notation, Notation::R1C1) {
            return false;
        }
        let mut open = false;
        for &ch in &self.chars[start..self.pos] {
            match ch {
                '[' => open = true,
                ']' => open = false,
                _ => {}
            }
        }
        match self.peek() {
            Some('[') => matches!(
                self.chars.get(self.pos.wrapping_sub(1)),
                Some('R' | 'r' | 'C' | 'c')
            ),
            Some(']') | Some('-') => open,
            _ => false,
        }
    }

    fn next_non_space(&self) -> Option<char> {
        self.chars[self.pos..]
            .iter()
            .copied()
            .find(|c| !c.is_whitespace())
    }
}

/// Parse `R`, `R3`, `R[-1]` followed by `C`, `C1`, `C[2]`
fn parse_r1c1_ref(word: &str) -> Option<CellRef> {
    let upper = word.to_ascii_uppercase();
    let rest = upper.strip_prefix('R')?;
    let (row, rest) = parse_r1c1_coord(rest)?;
    let rest = rest.strip_prefix('C')?;
    let (col, rest) = parse_r1c1_coord(rest)?;
    rest.is_empty().then_some(CellRef { row, col })
}

fn parse_r1c1_coord(text: &str) -> Option<(Coord, &str)> {
    if let Some(inner) = text.strip_prefix('[') {
        let end = inner.find(']')?;
        let delta = inner[..end].parse::<i32>().ok()?;
        return Some((Coord::Offset(delta), &inner[end + 1..]));
    }
    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return Some((Coord::Offset(0), text));
    }
    let index = text[..digits].parse::<u32>().ok().filter(|i| *i >= 1)?;
    Some((Coord::Absolute(index), &text[digits..]))
}

/// Parse `A1`, `$A1`, `A$1`, `$A$1` relative to the cell at `(row, col)`
fn parse_a1_ref(word: &str, row: u32, col: u32) -> Option<CellRef> {
    let mut rest = word;
    let col_abs = rest.starts_with('$');
    if col_abs {
        rest = &rest[1..];
    }
    let letters = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    let target_col = column_index(&rest[..letters])?;
    rest = &rest[letters..];
    let row_abs = rest.starts_with('$');
    if row_abs {
        rest = &rest[1..];
    }
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let target_row = rest.parse::<u32>().ok().filter(|r| *r >= 1)?;

    let col = if col_abs {
        Coord::Absolute(target_col)
    } else {
        Coord::Offset(i32::try_from(i64::from(target_col) - i64::from(col)).ok()?)
    };
    let row = if row_abs {
        Coord::Absolute(target_row)
    } else {
        Coord::Offset(i32::try_from(i64::from(target_row) - i64::from(row)).ok()?)
    };
    Some(CellRef { row, col })
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn new(text: &str, notation: Notation) -> Result<Self> {
        let body = text.trim_start();
        let body = body.strip_prefix('=').unwrap_or(body);
        let tokens = Lexer::new(body, notation).tokens()?;
        Ok(Self {
            tokens,
            pos: 0,
            len: body.chars().count(),
        })
    }

    fn error(&self, message: impl Into<String>) -> LedgerError {
        let position = self
            .tokens
            .get(self.pos)
            .map(|(_, p)| *p)
            .unwrap_or(self.len);
        LedgerError::FormulaParse {
            message: message.into(),
            position,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.advance() {
            Some(ref token) if *token == expected => Ok(()),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("expected {:?}", expected)))
            }
        }
    }

    fn parse(mut self) -> Result<Expr> {
        if self.tokens.is_empty() {
            return Err(self.error("empty formula"));
        }
        let expr = self.comparison()?;
        if self.pos < self.tokens.len() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn binary_level(
        &mut self,
        ops: &[BinaryOp],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if !ops.contains(&op) {
                break;
            }
            self.pos += 1;
            let right = next(self)?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                BinaryOp::Eq,
                BinaryOp::Ne,
                BinaryOp::Lt,
                BinaryOp::Le,
                BinaryOp::Gt,
                BinaryOp::Ge,
            ],
            Self::concat,
        )
    }

    fn concat(&mut self) -> Result<Expr> {
        self.binary_level(&[BinaryOp::Concat], Self::additive)
    }

    fn additive(&mut self) -> Result<Expr> {
        self.binary_level(&[BinaryOp::Add, BinaryOp::Sub], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        self.binary_level(&[BinaryOp::Mul, BinaryOp::Div], Self::unary)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Op(BinaryOp::Sub)) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op(BinaryOp::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Text(s)) => Ok(Expr::Text(s)),
            Some(Token::Ref(cell)) => Ok(Expr::Ref(cell)),
            Some(Token::LParen) => {
                let inner = self.comparison()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.arguments()?;
                    return Ok(Expr::Call { name, args });
                }
                match name.as_str() {
                    "TRUE" => Ok(Expr::Bool(true)),
                    "FALSE" => Ok(Expr::Bool(false)),
                    _ => {
                        self.pos -= 1;
                        Err(self.error(format!("unsupported name '{}'", name)))
                    }
                }
            }
            Some(_) => {
                self.pos -= 1;
                Err(self.error("unexpected token"))
            }
            None => Err(self.error("unexpected end of formula")),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.comparison()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.error("expected ',' or ')' in argument list"));
                }
            }
        }
    }
}
