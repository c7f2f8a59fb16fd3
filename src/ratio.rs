//! Exact rational numbers used as coefficients of symbolic expressions.

use std::cmp::Ordering;
use std::fmt;

/// A rational number `num / den` kept in lowest terms with `den > 0`.
///
/// Arithmetic is checked. Operations return `None` if the result does not
/// fit in an `i64` numerator and denominator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ratio {
    num: i64,
    den: i64,
}

fn gcd(a: i128, b: i128) -> u128 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Reduce `num / den` to lowest terms with a positive denominator.
///
/// Intermediate values are `i128` so that products of two `i64` values can
/// be reduced before the range check.
fn normalize(num: i128, den: i128) -> Option<Ratio> {
    if den == 0 {
        return None;
    }
    let div = i128::try_from(gcd(num, den).max(1)).ok()?;
    let (mut num, mut den) = (num / div, den / div);
    if den < 0 {
        num = num.checked_neg()?;
        den = den.checked_neg()?;
    }
    Some(Ratio {
        num: i64::try_from(num).ok()?,
        den: i64::try_from(den).ok()?,
    })
}

impl Ratio {
    pub const ZERO: Ratio = Ratio { num: 0, den: 1 };
    pub const ONE: Ratio = Ratio { num: 1, den: 1 };

    /// Create a ratio from a numerator and a non-zero denominator.
    ///
    /// Returns `None` if `den` is zero, or if normalizing the sign overflows.
    pub fn new(num: i64, den: i64) -> Option<Ratio> {
        normalize(num.into(), den.into())
    }

    pub const fn from_int(val: i64) -> Ratio {
        Ratio { num: val, den: 1 }
    }

    pub fn numer(&self) -> i64 {
        self.num
    }

    pub fn denom(&self) -> i64 {
        self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn is_integer(&self) -> bool {
        self.den == 1
    }

    /// Return the value as an integer, if it has no fractional part.
    pub fn to_integer(&self) -> Option<i64> {
        self.is_integer().then_some(self.num)
    }

    /// Round towards negative infinity.
    pub fn floor(&self) -> i64 {
        self.num.div_euclid(self.den)
    }

    /// Round towards positive infinity.
    pub fn ceil(&self) -> i64 {
        let floor = self.floor();
        if self.num.rem_euclid(self.den) == 0 {
            floor
        } else {
            // A fractional value is strictly below `i64::MAX`.
            floor + 1
        }
    }

    pub fn checked_add(self, rhs: Ratio) -> Option<Ratio> {
        let (a, b) = (i128::from(self.num), i128::from(self.den));
        let (c, d) = (i128::from(rhs.num), i128::from(rhs.den));
        let num = (a * d).checked_add(c * b)?;
        normalize(num, b * d)
    }

    pub fn checked_sub(self, rhs: Ratio) -> Option<Ratio> {
        self.checked_add(rhs.checked_neg()?)
    }

    pub fn checked_mul(self, rhs: Ratio) -> Option<Ratio> {
        let num = i128::from(self.num) * i128::from(rhs.num);
        let den = i128::from(self.den) * i128::from(rhs.den);
        normalize(num, den)
    }

    /// Divide by `rhs`, returning `None` if `rhs` is zero or the quotient
    /// overflows.
    pub fn checked_div(self, rhs: Ratio) -> Option<Ratio> {
        let num = i128::from(self.num) * i128::from(rhs.den);
        let den = i128::from(self.den) * i128::from(rhs.num);
        normalize(num, den)
    }

    /// Raise to a non-negative power by repeated squaring.
    pub fn checked_pow(self, mut exp: u32) -> Option<Ratio> {
        let mut out = Ratio::ONE;
        let mut base = self;
        while exp > 0 {
            if exp & 1 == 1 {
                out = out.checked_mul(base)?;
            }
            exp >>= 1;
            if exp > 0 {
                base = base.checked_mul(base)?;
            }
        }
        Some(out)
    }

    pub fn checked_neg(self) -> Option<Ratio> {
        Some(Ratio {
            num: self.num.checked_neg()?,
            den: self.den,
        })
    }
}

impl From<i64> for Ratio {
    fn from(val: i64) -> Ratio {
        Ratio::from_int(val)
    }
}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Ratio) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Ratio) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}
