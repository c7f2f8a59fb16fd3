//! Tensor shapes made of symbolic dimensions.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::dim::{Dim, DimError};
use crate::sym_expr::SymbolMap;

/// Resolve a possibly-negative index into a dimension of a shape with `ndim`
/// dimensions.
///
/// Negative indices count from the end. Returns `None` if the index is out
/// of range.
pub fn resolve_axis(ndim: usize, axis: isize) -> Option<usize> {
    let resolved = if axis < 0 {
        ndim as isize + axis
    } else {
        axis
    };
    (resolved >= 0 && (resolved as usize) < ndim).then_some(resolved as usize)
}

/// Return true if two dimensions agree.
///
/// Dimensions agree if either is auto, or if they are equal after replacing
/// symbols bound in `symbols`. A dimension whose substituted size overflows
/// agrees with nothing but itself.
pub fn dims_agree(a: &Dim, b: &Dim, symbols: &SymbolMap) -> bool {
    match (a, b) {
        (Dim::Auto, _) | (_, Dim::Auto) => true,
        (Dim::Expr(a), Dim::Expr(b)) => {
            a == b
                || matches!(
                    (a.substitute(symbols), b.substitute(symbols)),
                    (Ok(a), Ok(b)) if a == b
                )
        }
    }
}

/// Ordered sequence of dimensions describing the shape of a tensor.
///
/// Shapes are values: methods which change a dimension return a new shape.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(SmallVec<[Dim; 4]>);

impl Shape {
    pub fn from_dims(dims: impl IntoIterator<Item = Dim>) -> Shape {
        Shape(dims.into_iter().collect())
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.0
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Dim> {
        self.0.iter()
    }

    /// Return the dimension at `index`, which may be negative to count from
    /// the end.
    pub fn get_dim(&self, index: isize) -> Option<&Dim> {
        resolve_axis(self.ndim(), index).map(|idx| &self.0[idx])
    }

    /// Return a copy of this shape with the dimension at `index` replaced.
    ///
    /// Returns `None` if the index is out of range.
    pub fn set_dim(&self, index: isize, dim: Dim) -> Option<Shape> {
        let idx = resolve_axis(self.ndim(), index)?;
        let mut dims = self.0.clone();
        dims[idx] = dim;
        Some(Shape(dims))
    }

    /// Return true if any dimension is auto.
    pub fn has_auto(&self) -> bool {
        self.0.iter().any(|d| d.is_auto())
    }

    /// Return true if `self` and `other` have the same rank and each pair of
    /// dimensions agree according to [`dims_agree`].
    pub fn agrees_with(&self, other: &Shape, symbols: &SymbolMap) -> bool {
        self.ndim() == other.ndim()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| dims_agree(a, b, symbols))
    }

    /// Replace bound symbols in every dimension with their values.
    pub fn substitute(&self, symbols: &SymbolMap) -> Result<Shape, DimError> {
        self.0.iter().map(|d| d.substitute(symbols)).collect()
    }

    /// Return a copy of this shape where auto dimensions are replaced by
    /// the corresponding dimension from `other`.
    ///
    /// `other` must have the same rank.
    pub fn fill_auto(&self, other: &Shape) -> Shape {
        Shape(
            self.0
                .iter()
                .zip(other.iter())
                .map(|(dim, fill)| if dim.is_auto() { fill.clone() } else { dim.clone() })
                .collect(),
        )
    }

    /// Check that every dimension is valid.
    pub fn validate(&self) -> Result<(), DimError> {
        self.0.iter().try_for_each(|d| d.validate())
    }

    /// Return a new shape consisting of the dimensions of `self` followed by
    /// `dims`.
    pub fn concat(&self, dims: &[Dim]) -> Shape {
        Shape(self.0.iter().chain(dims).cloned().collect())
    }
}

/// Return true if two shapes agree. See [`Shape::agrees_with`].
pub fn shapes_agree(a: &Shape, b: &Shape, symbols: &SymbolMap) -> bool {
    a.agrees_with(b, symbols)
}

impl From<Vec<Dim>> for Shape {
    fn from(dims: Vec<Dim>) -> Shape {
        Shape(dims.into())
    }
}

impl<const N: usize> From<[Dim; N]> for Shape {
    fn from(dims: [Dim; N]) -> Shape {
        Shape::from_dims(dims)
    }
}

impl FromIterator<Dim> for Shape {
    fn from_iter<I: IntoIterator<Item = Dim>>(iter: I) -> Shape {
        Shape::from_dims(iter)
    }
}

impl<'a> IntoIterator for &'a Shape {
    type Item = &'a Dim;
    type IntoIter = std::slice::Iter<'a, Dim>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
pub(crate) use tests::shape;
