//! Dimension sizes and the arithmetic used to propagate them.

use std::error::Error;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ErrorKind;
use crate::sym_expr::{ExprError, OverflowError, SymExpr, SymbolMap};

/// Textual form of [`Dim::Auto`].
pub const AUTO_TAG: &str = "<<auto>>";

const VARIABLE_PREFIX: &str = "<<variable:";
const TAG_SUFFIX: &str = ">>";

/// Size of one dimension of a shape.
///
/// Dimensions are either an expression, which may be a known integer or
/// involve named symbols, or "auto", which means the size has not been
/// determined yet and should be solved for from context.
///
/// Arithmetic on dimensions propagates "auto": if either operand is auto, so
/// is the result. Sizes which do not fit in an `i64` fail with
/// [`DimError::Overflow`].
///
/// In JSON a dimension is either an integer, the string `"<<auto>>"` or a
/// string of the form `"<<variable:EXPR>>"` where `EXPR` is an expression
/// accepted by [`SymExpr::parse`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Size to be solved for from context.
    Auto,
    /// Known integer or symbolic size.
    Expr(SymExpr),
}

impl Dim {
    /// Create a dimension with a known size.
    pub fn value(size: i64) -> Dim {
        Dim::Expr(SymExpr::value(size))
    }

    /// Create a dimension whose size is a named symbol.
    pub fn var(name: &str) -> Dim {
        Dim::Expr(SymExpr::var(name))
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Dim::Auto)
    }

    /// Return the size if this is a known integer.
    pub fn as_value(&self) -> Option<i64> {
        match self {
            Dim::Auto => None,
            Dim::Expr(expr) => expr.as_value(),
        }
    }

    pub fn as_expr(&self) -> Option<&SymExpr> {
        match self {
            Dim::Auto => None,
            Dim::Expr(expr) => Some(expr),
        }
    }

    /// Replace bound symbols with their values.
    pub fn substitute(&self, symbols: &SymbolMap) -> Result<Dim, DimError> {
        match self {
            Dim::Auto => Ok(Dim::Auto),
            Dim::Expr(expr) => Ok(Dim::Expr(expr.substitute(symbols)?)),
        }
    }

    pub fn checked_add(&self, rhs: &Dim) -> Result<Dim, DimError> {
        match (self, rhs) {
            (Dim::Expr(lhs), Dim::Expr(rhs)) => Ok(Dim::Expr(lhs.checked_add(rhs)?)),
            _ => Ok(Dim::Auto),
        }
    }

    pub fn checked_mul(&self, rhs: &Dim) -> Result<Dim, DimError> {
        match (self, rhs) {
            (Dim::Expr(lhs), Dim::Expr(rhs)) => Ok(Dim::Expr(lhs.checked_mul(rhs)?)),
            _ => Ok(Dim::Auto),
        }
    }

    /// Return true if this is a valid dimension size.
    ///
    /// Valid dimensions are auto, integers >= 1 and expressions involving at
    /// least one symbol.
    pub fn is_valid(&self) -> bool {
        match self {
            Dim::Auto => true,
            Dim::Expr(expr) => match expr.as_ratio() {
                Some(val) => val.to_integer().is_some_and(|v| v >= 1),
                None => true,
            },
        }
    }

    /// Return an error if [`is_valid`](Self::is_valid) is false.
    pub fn validate(&self) -> Result<(), DimError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(DimError::Invalid(self.clone()))
        }
    }

    /// Parse the tagged text form of a dimension.
    ///
    /// Accepts `"<<auto>>"`, `"<<variable:EXPR>>"` or a decimal integer.
    pub fn parse(text: &str) -> Result<Dim, DimError> {
        let parse_error = |error| DimError::Parse {
            text: text.to_string(),
            error,
        };

        if text == AUTO_TAG {
            Ok(Dim::Auto)
        } else if let Some(expr) = text
            .strip_prefix(VARIABLE_PREFIX)
            .and_then(|rest| rest.strip_suffix(TAG_SUFFIX))
        {
            let expr = SymExpr::parse(expr).map_err(|err| parse_error(Some(err)))?;
            Ok(Dim::Expr(expr))
        } else if let Ok(size) = text.trim().parse::<i64>() {
            Ok(Dim::value(size))
        } else {
            Err(parse_error(None))
        }
    }

    /// Return the tagged text form of this dimension, as accepted by
    /// [`parse`](Self::parse).
    pub fn to_tagged(&self) -> String {
        match self {
            Dim::Auto => AUTO_TAG.to_string(),
            Dim::Expr(expr) => match expr.as_value() {
                Some(size) => size.to_string(),
                None => format!("{}{}{}", VARIABLE_PREFIX, expr, TAG_SUFFIX),
            },
        }
    }

    /// Divide `self` by `divisor`.
    ///
    /// The result is auto if either operand is auto. Division must be exact:
    /// a constant result must be an integer, and a symbolic result must be
    /// expressible as a polynomial (eg. `2*W / 2` is `W`, but `W / H` fails).
    pub fn divide(&self, divisor: &Dim) -> Result<Dim, DimError> {
        if divisor.as_expr().is_some_and(|d| d.is_zero()) {
            return Err(DimError::DivisionByZero);
        }
        let (Dim::Expr(lhs), Dim::Expr(rhs)) = (self, divisor) else {
            return Ok(Dim::Auto);
        };

        let inexact = || DimError::InexactDivision {
            dividend: self.clone(),
            divisor: divisor.clone(),
        };
        let quotient = lhs.checked_div(rhs).map_err(|err| match err {
            ExprError::Overflow => DimError::Overflow,
            ExprError::DivisionByZero => DimError::DivisionByZero,
            _ => inexact(),
        })?;
        if quotient.is_constant() && quotient.as_value().is_none() {
            return Err(inexact());
        }
        Ok(Dim::Expr(quotient))
    }

    /// Return the sum of a sequence of dimensions.
    pub fn sum<'a>(dims: impl IntoIterator<Item = &'a Dim>) -> Result<Dim, DimError> {
        dims.into_iter()
            .try_fold(Dim::value(0), |acc, dim| acc.checked_add(dim))
    }

    /// Return the product of a sequence of dimensions.
    pub fn product<'a>(dims: impl IntoIterator<Item = &'a Dim>) -> Result<Dim, DimError> {
        dims.into_iter()
            .try_fold(Dim::value(1), |acc, dim| acc.checked_mul(dim))
    }

    /// Solve for the single auto entry in `factors` such that the product
    /// of `factors` equals `total`.
    ///
    /// Returns auto if `total` is auto. Fails if `factors` does not contain
    /// exactly one auto entry, or if `total` is not exactly divisible by the
    /// product of the other factors.
    pub fn solve_factor(total: &Dim, factors: &[Dim]) -> Result<Dim, DimError> {
        let unknowns = factors.iter().filter(|d| d.is_auto()).count();
        if unknowns != 1 {
            return Err(DimError::UnknownCount(unknowns));
        }
        let known = Dim::product(factors.iter().filter(|d| !d.is_auto()))?;
        total.divide(&known)
    }
}

impl From<SymExpr> for Dim {
    fn from(expr: SymExpr) -> Dim {
        Dim::Expr(expr)
    }
}

impl From<i64> for Dim {
    fn from(size: i64) -> Dim {
        Dim::value(size)
    }
}

impl From<i32> for Dim {
    fn from(size: i32) -> Dim {
        Dim::value(size as i64)
    }
}

/// Create a symbolic dimension with a given name, or an auto dimension if
/// the name is `"auto"`.
impl<'a> From<&'a str> for Dim {
    fn from(name: &'a str) -> Dim {
        if name == "auto" {
            Dim::Auto
        } else {
            Dim::var(name)
        }
    }
}

/// Compact form used in messages, eg. `auto`, `16` or `H/2`.
impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Auto => write!(f, "auto"),
            Dim::Expr(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Debug for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Serialize for Dim {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_value() {
            Some(size) => serializer.serialize_i64(size),
            None => serializer.serialize_str(&self.to_tagged()),
        }
    }
}

impl<'de> Deserialize<'de> for Dim {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DimVisitor)
    }
}

struct DimVisitor;

impl Visitor<'_> for DimVisitor {
    type Value = Dim;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an integer, \"<<auto>>\" or \"<<variable:EXPR>>\"")
    }

    fn visit_i64<E: de::Error>(self, val: i64) -> Result<Dim, E> {
        Ok(Dim::value(val))
    }

    fn visit_u64<E: de::Error>(self, val: u64) -> Result<Dim, E> {
        i64::try_from(val)
            .map(Dim::value)
            .map_err(|_| E::custom(format!("dimension {} is too large", val)))
    }

    fn visit_str<E: de::Error>(self, val: &str) -> Result<Dim, E> {
        Dim::parse(val).map_err(E::custom)
    }
}

/// Compute the output length of a convolution or pooling window along one
/// spatial axis.
///
/// The output length is
/// `1 + (length + pad_start + pad_end - dilation * (kernel - 1) - 1) / stride`,
/// using flooring division. If `length` is symbolic, the division is kept
/// symbolic and the constant term of the result is rounded down.
pub fn conv_output_length(
    length: &Dim,
    kernel: i64,
    stride: i64,
    pad_start: i64,
    pad_end: i64,
    dilation: i64,
) -> Result<Dim, DimError> {
    if stride == 0 {
        return Err(DimError::DivisionByZero);
    }
    let Dim::Expr(length) = length else {
        return Ok(Dim::Auto);
    };

    let window = kernel
        .checked_sub(1)
        .and_then(|k| dilation.checked_mul(k))
        .and_then(|w| w.checked_add(1))
        .ok_or(DimError::Overflow)?;
    let offset = pad_start
        .checked_add(pad_end)
        .and_then(|pad| pad.checked_sub(window))
        .ok_or(DimError::Overflow)?;
    let numerator = length.checked_add(&SymExpr::value(offset))?;
    let out = match numerator.as_ratio() {
        Some(num) => {
            let num = num.to_integer().unwrap_or_else(|| num.floor());
            let len = num
                .checked_div_euclid(stride)
                .and_then(|q| q.checked_add(1))
                .ok_or(DimError::Overflow)?;
            SymExpr::value(len)
        }
        None => {
            let quotient = divide_expr(&numerator, stride)?;
            quotient.checked_add(&SymExpr::value(1))?.floor_constant()
        }
    };

    let out = Dim::Expr(out);
    if out.as_value().is_some_and(|size| size <= 0) {
        return Err(DimError::NonPositive(out));
    }
    Ok(out)
}

/// Compute the output length along one spatial axis for "same" padding.
///
/// This is `ceil(length / stride)`. If `length` is symbolic the constant term
/// of the quotient is rounded up.
pub fn same_output_length(length: &Dim, stride: i64) -> Result<Dim, DimError> {
    if stride == 0 {
        return Err(DimError::DivisionByZero);
    }
    let Dim::Expr(length) = length else {
        return Ok(Dim::Auto);
    };
    let quotient = divide_expr(length, stride)?;
    Ok(Dim::Expr(quotient.ceil_constant()))
}

/// Divide an expression by a non-zero integer stride.
fn divide_expr(expr: &SymExpr, stride: i64) -> Result<SymExpr, DimError> {
    expr.checked_div(&SymExpr::value(stride))
        .map_err(|err| match err {
            ExprError::Overflow => DimError::Overflow,
            _ => DimError::DivisionByZero,
        })
}

/// Errors from dimension parsing and arithmetic.
#[derive(Clone, Debug, PartialEq)]
pub enum DimError {
    /// Text could not be parsed as a dimension.
    Parse {
        text: String,
        error: Option<ExprError>,
    },

    /// Dimension is not an integer >= 1, a symbolic expression or auto.
    Invalid(Dim),

    /// A dimension was divided by zero.
    DivisionByZero,

    /// The quotient of a division is not an integer or polynomial.
    InexactDivision { dividend: Dim, divisor: Dim },

    /// Solving for an unknown dimension requires exactly one auto dimension,
    /// but a different number were found.
    UnknownCount(usize),

    /// A computed size is zero or negative.
    NonPositive(Dim),

    /// The product of a list of factors does not equal the size it should
    /// split.
    ProductMismatch { total: Dim, product: Dim },

    /// A computed size does not fit in an `i64`.
    Overflow,
}

impl DimError {
    /// Return the category of resolution error this corresponds to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } | Self::Invalid(_) => ErrorKind::Validation,
            Self::DivisionByZero
            | Self::InexactDivision { .. }
            | Self::UnknownCount(_)
            | Self::NonPositive(_)
            | Self::ProductMismatch { .. }
            | Self::Overflow => ErrorKind::Dimension,
        }
    }
}

impl fmt::Display for DimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { text, error } => {
                write!(f, "invalid dimension \"{}\"", text)?;
                if let Some(err) = error {
                    write!(f, ": {}", err)?;
                }
                Ok(())
            }
            Self::Invalid(dim) => write!(
                f,
                "invalid dimension {}, expected an integer >= 1, a symbolic expression or auto",
                dim
            ),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::InexactDivision { dividend, divisor } => {
                write!(f, "{} is not exactly divisible by {}", dividend, divisor)
            }
            Self::UnknownCount(count) => write!(
                f,
                "expected exactly one auto dimension to solve for, found {}",
                count
            ),
            Self::NonPositive(dim) => write!(f, "computed dimension {} is not positive", dim),
            Self::ProductMismatch { total, product } => {
                write!(f, "product of sizes {} does not equal {}", product, total)
            }
            Self::Overflow => write!(f, "{}", OverflowError),
        }
    }
}

impl Error for DimError {}

impl From<OverflowError> for DimError {
    fn from(_: OverflowError) -> DimError {
        DimError::Overflow
    }
}
