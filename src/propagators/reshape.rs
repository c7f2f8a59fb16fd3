use serde_json::Value;

use crate::architecture::Block;
use crate::config::{ConfigError, ConfigErrorKind};
use crate::dim::{Dim, DimError};
use crate::propagate::{
    Propagate, PropagateContext, PropagateError, check_input_count, check_input_shapes,
};
use crate::shape::{Shape, dims_agree};

const SPEC_KEY: &str = "reshape_spec";

/// One output group of a reshape.
#[derive(Clone, Debug, PartialEq)]
pub enum ReshapeItem {
    /// Copy an input dimension.
    Index(usize),

    /// Merge several input dimensions into one, whose size is their product.
    Flatten(Vec<usize>),

    /// Split one input dimension into several. At most one of the new
    /// dimensions may be auto, and is solved so that the product of the
    /// new dimensions equals the input size.
    Unflatten { index: usize, dims: Vec<Dim> },
}

/// Target layout of a `Reshape` block, from its `reshape_spec` option.
///
/// The option is either the string `"flatten"`, which merges all input
/// dimensions into one, or a list of items. Each item is an input index, a
/// list of input indices to flatten, or an object `{"<index>": [dims]}`
/// which unflattens an input dimension. For example `[1, {"0": [4, "<<auto>>"]}]`
/// swaps the two dimensions of the input and splits the first one.
///
/// Each input dimension must be used exactly once, so reshapes may permute
/// dimensions but never drop or repeat them.
#[derive(Clone, Debug, PartialEq)]
pub enum ReshapeSpec {
    Flatten,
    Items(Vec<ReshapeItem>),
}

impl ReshapeSpec {
    /// Parse the JSON value of a `reshape_spec` option.
    pub fn from_value(value: &Value) -> Result<ReshapeSpec, ConfigError> {
        let invalid = |msg: &str| ConfigError::invalid_value(SPEC_KEY, msg);
        let index = |val: &Value| {
            val.as_u64()
                .map(|idx| idx as usize)
                .ok_or_else(|| invalid("indices must be non-negative integers"))
        };

        match value {
            Value::String(s) if s == "flatten" => Ok(ReshapeSpec::Flatten),
            Value::Array(items) if !items.is_empty() => {
                let items = items
                    .iter()
                    .map(|item| match item {
                        Value::Number(_) => index(item).map(ReshapeItem::Index),
                        Value::Array(idxs) if !idxs.is_empty() => idxs
                            .iter()
                            .map(&index)
                            .collect::<Result<_, _>>()
                            .map(ReshapeItem::Flatten),
                        Value::Object(map) if map.len() == 1 => {
                            let Some((key, dims)) = map.iter().next() else {
                                return Err(invalid("empty unflatten item"));
                            };
                            let pos: usize = key
                                .parse()
                                .map_err(|_| invalid("unflatten keys must be indices"))?;
                            let Value::Array(dims) = dims else {
                                return Err(invalid("unflatten sizes must be a list"));
                            };
                            let dims = dims
                                .iter()
                                .map(|dim| {
                                    serde_json::from_value::<Dim>(dim.clone())
                                        .map_err(|err| invalid(&err.to_string()))
                                })
                                .collect::<Result<Vec<_>, _>>()?;
                            if dims.len() < 2 {
                                return Err(invalid("unflatten requires at least two sizes"));
                            }
                            if let Some(dim) = dims.iter().find(|d| !d.is_valid()) {
                                return Err(ConfigError::new(
                                    SPEC_KEY,
                                    ConfigErrorKind::InvalidDim(DimError::Invalid(dim.clone())),
                                ));
                            }
                            Ok(ReshapeItem::Unflatten { index: pos, dims })
                        }
                        _ => Err(invalid(
                            "items must be an index, a list of indices or an unflatten object",
                        )),
                    })
                    .collect::<Result<_, _>>()?;
                Ok(ReshapeSpec::Items(items))
            }
            _ => Err(invalid("expected \"flatten\" or a non-empty list")),
        }
    }

    /// Return the input indices used by this spec, in order of use.
    fn indices(&self, ndim: usize) -> Vec<usize> {
        match self {
            ReshapeSpec::Flatten => (0..ndim).collect(),
            ReshapeSpec::Items(items) => items
                .iter()
                .flat_map(|item| match item {
                    ReshapeItem::Index(idx) => vec![*idx],
                    ReshapeItem::Flatten(idxs) => idxs.clone(),
                    ReshapeItem::Unflatten { index, .. } => vec![*index],
                })
                .collect(),
        }
    }

    /// Check that each input dimension is used exactly once.
    fn check_indices(&self, ndim: usize) -> Result<(), ConfigError> {
        let mut indices = self.indices(ndim);
        indices.sort_unstable();
        if !indices.iter().copied().eq(0..ndim) {
            return Err(ConfigError::invalid_value(
                SPEC_KEY,
                format!(
                    "indices {:?} are not a permutation of the {} input dimensions",
                    indices, ndim
                ),
            ));
        }
        Ok(())
    }
}

fn reshape_spec(block: &Block) -> Result<ReshapeSpec, ConfigError> {
    let value = block
        .config
        .get(SPEC_KEY)
        .ok_or_else(|| ConfigError::missing(SPEC_KEY))?;
    ReshapeSpec::from_value(value)
}

/// Permute, flatten and unflatten the dimensions of the input.
///
/// Flattening gives the product of the merged dimensions. Unflattening
/// preserves the element count: with one auto size, that size is solved for,
/// otherwise the product of the sizes must equal the input dimension.
pub struct Reshape;

impl Propagate for Reshape {
    fn initial_checks(&self, block: &Block, inputs: &[Shape]) -> Result<(), PropagateError> {
        check_input_count(self.arity(), inputs)?;
        check_input_shapes(inputs)?;
        reshape_spec(block)?.check_indices(inputs[0].ndim())?;
        Ok(())
    }

    fn propagate(
        &self,
        block: &Block,
        inputs: &[Shape],
        ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError> {
        let input = inputs[0].dims();
        let items = match reshape_spec(block)? {
            ReshapeSpec::Flatten => return Ok(Shape::from_dims([Dim::product(input)?])),
            ReshapeSpec::Items(items) => items,
        };

        let mut output = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ReshapeItem::Index(idx) => output.push(input[idx].clone()),
                ReshapeItem::Flatten(idxs) => {
                    output.push(Dim::product(idxs.iter().map(|idx| &input[*idx]))?)
                }
                ReshapeItem::Unflatten { index, mut dims } => {
                    let total = &input[index];
                    if let Some(auto_pos) = dims.iter().position(|d| d.is_auto()) {
                        dims[auto_pos] = Dim::solve_factor(total, &dims)?;
                    } else {
                        let product = Dim::product(&dims)?;
                        if !dims_agree(total, &product, ctx.symbols()) {
                            return Err(DimError::ProductMismatch {
                                total: total.clone(),
                                product,
                            }
                            .into());
                        }
                    }
                    output.extend(dims);
                }
            }
        }
        Ok(Shape::from(output))
    }
}
