//! Shape propagators for the built-in block types.

use crate::architecture::Block;
use crate::config::ConfigError;
use crate::dim::Dim;
use crate::propagate::{Arity, Propagate, PropagateContext, PropagateError};
use crate::shape::{Shape, dims_agree, resolve_axis};

mod conv_pool;
mod fixed;
mod group;
mod reshape;
mod rnn;

pub use conv_pool::{Conv, Pool};
pub use fixed::{AppendFixed, FixedOutput};
pub use group::{Group, Sequential};
pub use reshape::{Reshape, ReshapeItem, ReshapeSpec};
pub use rnn::Recurrent;

/// Block types whose output has the same shape as their single input, eg.
/// activations and normalization layers.
pub struct SameShape;

impl Propagate for SameShape {
    fn propagate(
        &self,
        _block: &Block,
        inputs: &[Shape],
        _ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError> {
        let [input] = inputs else {
            return Err(PropagateError::IncorrectInputCount {
                expected: self.arity(),
                actual: inputs.len(),
            });
        };
        Ok(input.clone())
    }
}

/// Block types which combine two or more inputs of the same shape
/// element-wise, eg. `Add`.
///
/// The output takes the first input's shape, with auto dimensions filled in
/// from later inputs.
pub struct SameShapes;

impl Propagate for SameShapes {
    fn arity(&self) -> Arity {
        Arity::AtLeast(2)
    }

    fn propagate(
        &self,
        _block: &Block,
        inputs: &[Shape],
        ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError> {
        let [first, rest @ ..] = inputs else {
            return Err(PropagateError::IncorrectInputCount {
                expected: self.arity(),
                actual: 0,
            });
        };

        let mut output = first.clone();
        for (i, shape) in rest.iter().enumerate() {
            if !output.agrees_with(shape, ctx.symbols()) {
                return Err(PropagateError::ShapeMismatch(format!(
                    "input {} has shape {} which does not match {}",
                    i + 1,
                    shape,
                    first
                )));
            }
            output = output.fill_auto(shape);
        }
        Ok(output)
    }
}

/// Concatenates two or more inputs along the axis given by the `dim` option.
///
/// Inputs must have the same rank and agree on every other axis.
pub struct Concat;

impl Propagate for Concat {
    fn arity(&self) -> Arity {
        Arity::AtLeast(2)
    }

    fn propagate(
        &self,
        block: &Block,
        inputs: &[Shape],
        ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError> {
        let [first, rest @ ..] = inputs else {
            return Err(PropagateError::IncorrectInputCount {
                expected: self.arity(),
                actual: 0,
            });
        };

        let dim = block
            .config
            .get_int("dim")?
            .ok_or_else(|| ConfigError::missing("dim"))?;
        let ndim = first.ndim();
        let axis = resolve_axis(ndim, dim as isize).ok_or_else(|| {
            PropagateError::Invalid(format!(
                "dim {} is out of range for inputs of rank {}",
                dim, ndim
            ))
        })?;

        for (i, shape) in rest.iter().enumerate() {
            if shape.ndim() != ndim {
                return Err(PropagateError::rank(ndim, shape.ndim()));
            }
            let mismatch = first
                .iter()
                .zip(shape.iter())
                .enumerate()
                .find(|(j, (a, b))| *j != axis && !dims_agree(a, b, ctx.symbols()));
            if let Some((j, _)) = mismatch {
                return Err(PropagateError::ShapeMismatch(format!(
                    "input {} has shape {} which does not match {} at axis {}",
                    i + 1,
                    shape,
                    first,
                    j
                )));
            }
        }

        let sum = Dim::sum(inputs.iter().filter_map(|s| s.get_dim(axis as isize)))?;
        let mut output = first.clone();
        for shape in rest {
            output = output.fill_auto(shape);
        }
        Ok(output.set_dim(axis as isize, sum).unwrap_or(output))
    }
}

#[cfg(test)]
pub(crate) use tests::run_propagator;
