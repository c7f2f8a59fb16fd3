use crate::architecture::Block;
use crate::config::ConfigError;
use crate::dim::Dim;
use crate::propagate::{
    Propagate, PropagateContext, PropagateError, check_input_count, check_input_shapes,
};
use crate::shape::Shape;

/// Read the `output_feats` option of a block which sets `count` dimensions.
///
/// The option may be a single dimension, which is used for every output
/// dimension, or a list of exactly `count` dimensions. Concrete values must
/// be >= 1.
fn output_feats(block: &Block, count: usize) -> Result<Vec<Dim>, ConfigError> {
    const KEY: &str = "output_feats";

    let dims = block
        .config
        .get_dims(KEY)?
        .ok_or_else(|| ConfigError::missing(KEY))?;
    let dims = match dims.len() {
        1 if count > 1 && !matches!(block.config.get(KEY), Some(serde_json::Value::Array(_))) => {
            vec![dims[0].clone(); count]
        }
        n if n == count => dims,
        n => {
            return Err(ConfigError::invalid_value(
                KEY,
                format!("expected {} dimension(s), got {}", count, n),
            ));
        }
    };

    if let Some(dim) = dims.iter().find(|d| d.is_auto() || !d.is_valid()) {
        return Err(ConfigError::invalid_value(
            KEY,
            format!("{} is not a size >= 1 or a variable", dim),
        ));
    }
    Ok(dims)
}

/// Block types which replace one or more trailing feature dimensions of
/// their input with sizes from the `output_feats` option.
///
/// Examples include `Linear` and adaptive pooling.
#[derive(Debug)]
pub struct FixedOutput {
    /// Number of trailing dimensions replaced by the output sizes.
    pub fixed_dims: usize,

    /// Exact number of leading dimensions which pass through unchanged, or
    /// `None` to allow any number.
    pub unfixed_dims: Option<usize>,
}

impl FixedOutput {
    /// Propagator for blocks that replace the last dimension and accept
    /// inputs of any rank, eg. `Linear`.
    pub fn features() -> FixedOutput {
        FixedOutput {
            fixed_dims: 1,
            unfixed_dims: None,
        }
    }

    /// Propagator for adaptive pooling over `spatial_dims` dimensions of a
    /// channels-first input.
    pub fn adaptive_pool(spatial_dims: usize) -> FixedOutput {
        FixedOutput {
            fixed_dims: spatial_dims,
            unfixed_dims: Some(1),
        }
    }
}

impl Propagate for FixedOutput {
    fn initial_checks(&self, block: &Block, inputs: &[Shape]) -> Result<(), PropagateError> {
        check_input_count(self.arity(), inputs)?;
        check_input_shapes(inputs)?;

        let ndim = inputs[0].ndim();
        match self.unfixed_dims {
            Some(unfixed) if ndim != unfixed + self.fixed_dims => {
                return Err(PropagateError::rank(unfixed + self.fixed_dims, ndim));
            }
            None if ndim < self.fixed_dims => {
                return Err(PropagateError::rank(
                    format!("at least {}", self.fixed_dims),
                    ndim,
                ));
            }
            _ => {}
        }

        output_feats(block, self.fixed_dims)?;
        Ok(())
    }

    fn propagate(
        &self,
        block: &Block,
        inputs: &[Shape],
        _ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError> {
        let input = &inputs[0];
        let feats = output_feats(block, self.fixed_dims)?;
        let keep = input.ndim() - self.fixed_dims;
        Ok(Shape::from_dims(
            input.iter().take(keep).cloned().chain(feats),
        ))
    }
}

/// Block types which append `fixed_dims` dimensions from `output_feats` to
/// their input shape, eg. `Embedding`.
pub struct AppendFixed {
    pub fixed_dims: usize,
}

impl Propagate for AppendFixed {
    fn propagate(
        &self,
        block: &Block,
        inputs: &[Shape],
        _ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError> {
        let feats = output_feats(block, self.fixed_dims)?;
        Ok(inputs[0].concat(&feats))
    }
}
