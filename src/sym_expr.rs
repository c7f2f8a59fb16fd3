//! Symbolic expressions representing dimension sizes.

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::ratio::Ratio;

/// Map of symbol name to bound value.
pub type SymbolMap = FxHashMap<String, i64>;

/// Product of symbols raised to positive powers, sorted by symbol name.
///
/// The empty monomial is the constant `1`.
type Monomial = Vec<(String, u32)>;

/// Multiply two monomials, or return `None` if a power overflows.
fn mul_monomials(a: &Monomial, b: &Monomial) -> Option<Monomial> {
    let mut out = Monomial::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => {
                out.push(a[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push((a[i].0.clone(), a[i].1.checked_add(b[j].1)?));
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    Some(out)
}

/// Divide monomial `a` by `b`, or return `None` if `b` does not divide `a`.
fn div_monomials(a: &Monomial, b: &Monomial) -> Option<Monomial> {
    let mut out = a.clone();
    for (name, power) in b {
        let pos = out.iter().position(|(n, _)| n == name)?;
        let remaining = out[pos].1.checked_sub(*power)?;
        if remaining == 0 {
            out.remove(pos);
        } else {
            out[pos].1 = remaining;
        }
    }
    Some(out)
}

/// Error when a coefficient of an expression does not fit in an `i64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverflowError;

impl fmt::Display for OverflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "size does not fit in a 64-bit integer")
    }
}

impl Error for OverflowError {}

/// Symbolic expression representing a dimension size.
///
/// Expressions are polynomials with exact rational coefficients over named
/// symbols. They are always kept in canonical form, so two expressions compare
/// equal if and only if they are algebraically equal. For example `(8*X+4)/2`
/// and `4*X+2` are the same expression.
///
/// Arithmetic fails with [`OverflowError`] instead of wrapping or panicking
/// if a coefficient leaves the range of an `i64`.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct SymExpr {
    // Terms with zero coefficients are never stored.
    terms: BTreeMap<Monomial, Ratio>,
}

impl SymExpr {
    /// Create an expression with a known integer value.
    pub fn value(val: i64) -> SymExpr {
        SymExpr::from_ratio(Ratio::from_int(val))
    }

    /// Create an expression consisting of a single named symbol.
    pub fn var(name: &str) -> SymExpr {
        let mut terms = BTreeMap::new();
        terms.insert(vec![(name.to_string(), 1)], Ratio::ONE);
        SymExpr { terms }
    }

    fn from_ratio(val: Ratio) -> SymExpr {
        let mut terms = BTreeMap::new();
        if !val.is_zero() {
            terms.insert(Monomial::new(), val);
        }
        SymExpr { terms }
    }

    fn add_term(&mut self, monomial: Monomial, coeff: Ratio) -> Result<(), OverflowError> {
        let sum = match self.terms.get(&monomial) {
            Some(prev) => prev.checked_add(coeff).ok_or(OverflowError)?,
            None => coeff,
        };
        if sum.is_zero() {
            self.terms.remove(&monomial);
        } else {
            self.terms.insert(monomial, sum);
        }
        Ok(())
    }

    fn scale(&self, factor: Ratio) -> Result<SymExpr, OverflowError> {
        let mut out = SymExpr::default();
        for (monomial, coeff) in &self.terms {
            let coeff = coeff.checked_mul(factor).ok_or(OverflowError)?;
            out.add_term(monomial.clone(), coeff)?;
        }
        Ok(out)
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Return true if the expression contains no symbols.
    pub fn is_constant(&self) -> bool {
        self.terms.keys().all(|m| m.is_empty())
    }

    /// Return the value of a constant expression.
    ///
    /// The value may have a fractional part. See also [`as_value`](Self::as_value).
    pub fn as_ratio(&self) -> Option<Ratio> {
        self.is_constant().then(|| self.constant_term())
    }

    /// Return the value of the expression if it is a constant integer.
    pub fn as_value(&self) -> Option<i64> {
        self.as_ratio().and_then(|r| r.to_integer())
    }

    /// Return the term of the expression which has no symbols.
    pub fn constant_term(&self) -> Ratio {
        self.terms
            .get(&Monomial::new())
            .copied()
            .unwrap_or(Ratio::ZERO)
    }

    /// Return the names of symbols used in this expression, in sorted order.
    pub fn symbols(&self) -> BTreeSet<&str> {
        self.terms
            .keys()
            .flat_map(|m| m.iter().map(|(name, _)| name.as_str()))
            .collect()
    }

    /// Replace symbols which have a value in `symbols` with that value.
    pub fn substitute(&self, symbols: &SymbolMap) -> Result<SymExpr, OverflowError> {
        let mut out = SymExpr::default();
        for (monomial, coeff) in &self.terms {
            let mut coeff = *coeff;
            let mut rest = Monomial::new();
            for (name, power) in monomial {
                if let Some(&val) = symbols.get(name) {
                    coeff = Ratio::from_int(val)
                        .checked_pow(*power)
                        .and_then(|factor| coeff.checked_mul(factor))
                        .ok_or(OverflowError)?;
                } else {
                    rest.push((name.clone(), *power));
                }
            }
            out.add_term(rest, coeff)?;
        }
        Ok(out)
    }

    pub fn checked_add(&self, rhs: &SymExpr) -> Result<SymExpr, OverflowError> {
        let mut out = self.clone();
        for (monomial, coeff) in &rhs.terms {
            out.add_term(monomial.clone(), *coeff)?;
        }
        Ok(out)
    }

    pub fn checked_sub(&self, rhs: &SymExpr) -> Result<SymExpr, OverflowError> {
        self.checked_add(&rhs.checked_neg()?)
    }

    pub fn checked_mul(&self, rhs: &SymExpr) -> Result<SymExpr, OverflowError> {
        let mut out = SymExpr::default();
        for (lhs_mono, lhs_coeff) in &self.terms {
            for (rhs_mono, rhs_coeff) in &rhs.terms {
                let coeff = lhs_coeff.checked_mul(*rhs_coeff).ok_or(OverflowError)?;
                let monomial = mul_monomials(lhs_mono, rhs_mono).ok_or(OverflowError)?;
                out.add_term(monomial, coeff)?;
            }
        }
        Ok(out)
    }

    pub fn checked_neg(&self) -> Result<SymExpr, OverflowError> {
        let neg_one = Ratio::from_int(-1);
        self.scale(neg_one)
    }

    /// Return the result of raising this expression to a non-negative power.
    pub fn checked_pow(&self, mut exp: u32) -> Result<SymExpr, OverflowError> {
        let mut out = SymExpr::value(1);
        let mut base = self.clone();
        while exp > 0 {
            if exp & 1 == 1 {
                out = out.checked_mul(&base)?;
            }
            exp >>= 1;
            if exp > 0 {
                base = base.checked_mul(&base)?;
            }
        }
        Ok(out)
    }

    /// Divide `self` by `rhs`.
    ///
    /// Division succeeds if `rhs` is a single non-zero term which divides
    /// every term of `self`, or if `self` is a constant multiple of `rhs`.
    /// The quotient may have fractional coefficients (eg. `X / 2`). Other
    /// quotients are not polynomials and fail with
    /// [`ExprError::InexactDivision`].
    pub fn checked_div(&self, rhs: &SymExpr) -> Result<SymExpr, ExprError> {
        if rhs.is_zero() {
            return Err(ExprError::DivisionByZero);
        }
        let inexact = || ExprError::InexactDivision {
            dividend: self.clone(),
            divisor: rhs.clone(),
        };

        if rhs.terms.len() == 1 {
            let (divisor, divisor_coeff) = rhs.terms.iter().next().ok_or_else(inexact)?;
            let mut out = SymExpr::default();
            for (monomial, coeff) in &self.terms {
                let quotient = div_monomials(monomial, divisor).ok_or_else(inexact)?;
                let coeff = coeff.checked_div(*divisor_coeff).ok_or(OverflowError)?;
                out.add_term(quotient, coeff)?;
            }
            return Ok(out);
        }

        // Multi-term divisor. Only handle the case where the dividend is a
        // constant multiple of the divisor.
        let (lead, lead_coeff) = rhs.terms.iter().next().ok_or_else(inexact)?;
        let factor = self
            .terms
            .get(lead)
            .ok_or_else(inexact)?
            .checked_div(*lead_coeff)
            .ok_or(OverflowError)?;
        if rhs.scale(factor)? == *self {
            Ok(SymExpr::from_ratio(factor))
        } else {
            Err(inexact())
        }
    }

    /// Replace the constant term with `round(constant)`.
    fn round_constant(&self, round: impl Fn(&Ratio) -> i64) -> SymExpr {
        let mut out = self.clone();
        let unit = Monomial::new();
        if let Some(constant) = out.terms.remove(&unit) {
            let rounded = round(&constant);
            if rounded != 0 {
                out.terms.insert(unit, Ratio::from_int(rounded));
            }
        }
        out
    }

    /// Return a copy of this expression with the constant term rounded down
    /// to an integer.
    pub fn floor_constant(&self) -> SymExpr {
        self.round_constant(Ratio::floor)
    }

    /// Return a copy of this expression with the constant term rounded up
    /// to an integer.
    pub fn ceil_constant(&self) -> SymExpr {
        self.round_constant(Ratio::ceil)
    }

    /// Parse an expression such as `2*H+1` or `(W-4)/2`.
    ///
    /// Supported syntax is integer literals, symbol names
    /// (`[A-Za-z_][A-Za-z0-9_]*`), the binary operators `+`, `-`, `*`, `/`
    /// and `**` (with a non-negative integer exponent), unary minus and
    /// parentheses.
    pub fn parse(text: &str) -> Result<SymExpr, ExprError> {
        let tokens = tokenize(text)?;
        let mut parser = ExprParser { tokens, pos: 0 };
        let expr = parser.expr()?;
        if let Some(tok) = parser.peek() {
            return Err(ExprError::UnexpectedToken(tok.to_string()));
        }
        Ok(expr)
    }
}

impl From<i64> for SymExpr {
    fn from(val: i64) -> Self {
        SymExpr::value(val)
    }
}

impl From<i32> for SymExpr {
    fn from(val: i32) -> Self {
        SymExpr::value(val as i64)
    }
}

impl<'a> From<&'a str> for SymExpr {
    fn from(name: &'a str) -> Self {
        SymExpr::var(name)
    }
}

fn fmt_term(f: &mut fmt::Formatter<'_>, monomial: &Monomial, coeff: Ratio) -> fmt::Result {
    if monomial.is_empty() {
        return write!(f, "{}", coeff);
    }

    let (num, den) = (coeff.numer(), coeff.denom());
    match num {
        1 => {}
        -1 => write!(f, "-")?,
        _ => write!(f, "{}*", num)?,
    }
    for (i, (name, power)) in monomial.iter().enumerate() {
        if i > 0 {
            write!(f, "*")?;
        }
        if *power == 1 {
            write!(f, "{}", name)?;
        } else {
            write!(f, "{}**{}", name, power)?;
        }
    }
    if den != 1 {
        write!(f, "/{}", den)?;
    }
    Ok(())
}

/// Formats the expression in the syntax accepted by [`SymExpr::parse`].
///
/// Terms with symbols come first, ordered by symbol name, followed by the
/// constant term.
impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }

        let unit = Monomial::new();
        let constant = self.terms.get(&unit);
        let symbolic = self.terms.iter().filter(|(m, _)| !m.is_empty());
        let ordered = symbolic.chain(constant.map(|c| (&unit, c)));

        for (i, (monomial, coeff)) in ordered.enumerate() {
            if i > 0 && coeff.numer() > 0 {
                write!(f, "+")?;
            }
            fmt_term(f, monomial, *coeff)?;
        }
        Ok(())
    }
}

impl fmt::Debug for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Errors when parsing a symbolic expression.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprError {
    /// The expression is empty or ends before an operand.
    UnexpectedEnd,
    /// A character is not part of the expression syntax.
    InvalidChar(char),
    /// A token appeared where it is not allowed.
    UnexpectedToken(String),
    /// An integer literal is too large.
    InvalidNumber(String),
    /// An exponent is not a non-negative integer.
    InvalidExponent,
    /// Division by zero.
    DivisionByZero,
    /// A division does not produce a polynomial.
    InexactDivision { dividend: SymExpr, divisor: SymExpr },
    /// A coefficient does not fit in an `i64`.
    Overflow,
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd => write!(f, "unexpected end of expression"),
            Self::InvalidChar(ch) => write!(f, "invalid character '{}'", ch),
            Self::UnexpectedToken(tok) => write!(f, "unexpected \"{}\"", tok),
            Self::InvalidNumber(num) => write!(f, "invalid number \"{}\"", num),
            Self::InvalidExponent => write!(f, "exponent must be a non-negative integer"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::InexactDivision { dividend, divisor } => {
                write!(f, "division of {} by {} is not exact", dividend, divisor)
            }
            Self::Overflow => write!(f, "{}", OverflowError),
        }
    }
}

impl Error for ExprError {}

impl From<OverflowError> for ExprError {
    fn from(_: OverflowError) -> ExprError {
        ExprError::Overflow
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(i64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Pow,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Pow => write!(f, "**"),
            Token::Slash => write!(f, "/"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        let tok = match ch {
            ch if ch.is_whitespace() => continue,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '*' => {
                if chars.next_if_eq(&'*').is_some() {
                    Token::Pow
                } else {
                    Token::Star
                }
            }
            '0'..='9' => {
                let mut digits = String::from(ch);
                while let Some(d) = chars.next_if(|c| c.is_ascii_digit()) {
                    digits.push(d);
                }
                let val = digits
                    .parse()
                    .map_err(|_| ExprError::InvalidNumber(digits.clone()))?;
                Token::Number(val)
            }
            ch if ch.is_ascii_alphabetic() || ch == '_' => {
                let mut name = String::from(ch);
                while let Some(c) = chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '_') {
                    name.push(c);
                }
                Token::Ident(name)
            }
            ch => return Err(ExprError::InvalidChar(ch)),
        };
        tokens.push(tok);
    }

    Ok(tokens)
}

/// Recursive descent parser for expressions.
///
/// ```text
/// expr   := term (("+" | "-") term)*
/// term   := unary (("*" | "/") unary)*
/// unary  := "-" unary | "+" unary | power
/// power  := atom ("**" number)?
/// atom   := number | ident | "(" expr ")"
/// ```
struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<SymExpr, ExprError> {
        let mut lhs = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                lhs = lhs.checked_add(&self.term()?)?;
            } else if self.eat(&Token::Minus) {
                lhs = lhs.checked_sub(&self.term()?)?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn term(&mut self) -> Result<SymExpr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                lhs = lhs.checked_mul(&self.unary()?)?;
            } else if self.eat(&Token::Slash) {
                lhs = lhs.checked_div(&self.unary()?)?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unary(&mut self) -> Result<SymExpr, ExprError> {
        if self.eat(&Token::Minus) {
            Ok(self.unary()?.checked_neg()?)
        } else if self.eat(&Token::Plus) {
            self.unary()
        } else {
            self.power()
        }
    }

    fn power(&mut self) -> Result<SymExpr, ExprError> {
        let base = self.atom()?;
        if !self.eat(&Token::Pow) {
            return Ok(base);
        }
        match self.next() {
            Some(Token::Number(exp)) => {
                let exp = u32::try_from(exp).map_err(|_| ExprError::InvalidExponent)?;
                Ok(base.checked_pow(exp)?)
            }
            Some(_) => Err(ExprError::InvalidExponent),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn atom(&mut self) -> Result<SymExpr, ExprError> {
        match self.next() {
            Some(Token::Number(val)) => Ok(SymExpr::value(val)),
            Some(Token::Ident(name)) => Ok(SymExpr::var(&name)),
            Some(Token::LParen) => {
                let expr = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    Some(tok) => Err(ExprError::UnexpectedToken(tok.to_string())),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(tok) => Err(ExprError::UnexpectedToken(tok.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}
