use crate::architecture::Block;
use crate::config::ConfigError;
use crate::dim::Dim;
use crate::propagate::{
    Propagate, PropagateContext, PropagateError, check_input_count, check_input_shapes,
};
use crate::shape::Shape;

/// Recurrent blocks (`RNN`, `LSTM`, `GRU`).
///
/// The input is either `[sequence, features]` or a batched
/// `[sequence, batch, features]` (`[batch, sequence, features]` when
/// `batch_first` is set). The sequence and batch dimensions keep their
/// positions and the feature dimension becomes
/// `hidden_size * (2 if bidirectional else 1)`.
///
/// Instead of `hidden_size`, a block may set `output_feats` to the total
/// output width. For bidirectional blocks this must be even.
pub struct Recurrent;

impl Recurrent {
    /// Return the output feature size of a block.
    fn output_feats(block: &Block) -> Result<Dim, ConfigError> {
        let config = &block.config;
        let bidirectional = config.get_bool("bidirectional", false)?;
        let directions = if bidirectional { 2 } else { 1 };

        let check = |key: &str, dim: Dim| {
            if dim.is_auto() || !dim.is_valid() {
                Err(ConfigError::invalid_value(
                    key,
                    format!("{} is not a size >= 1 or a variable", dim),
                ))
            } else {
                Ok(dim)
            }
        };

        if let Some(hidden) = config.get_dim("hidden_size")? {
            let hidden = check("hidden_size", hidden)?;
            return hidden
                .checked_mul(&Dim::value(directions))
                .map_err(|err| ConfigError::invalid_value("hidden_size", err.to_string()));
        }

        let feats = config
            .get_dim("output_feats")?
            .ok_or_else(|| ConfigError::missing("hidden_size"))?;
        let feats = check("output_feats", feats)?;
        if bidirectional
            && let Some(size) = feats.as_value()
            && size % 2 != 0
        {
            return Err(ConfigError::invalid_value(
                "output_feats",
                format!("bidirectional blocks require an even size, got {}", size),
            ));
        }
        Ok(feats)
    }
}

impl Propagate for Recurrent {
    fn initial_checks(&self, block: &Block, inputs: &[Shape]) -> Result<(), PropagateError> {
        check_input_count(self.arity(), inputs)?;
        check_input_shapes(inputs)?;
        let ndim = inputs[0].ndim();
        if !(2..=3).contains(&ndim) {
            return Err(PropagateError::rank("2 or 3", ndim));
        }
        block.config.get_bool("batch_first", false)?;
        Recurrent::output_feats(block)?;
        Ok(())
    }

    fn propagate(
        &self,
        block: &Block,
        inputs: &[Shape],
        _ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError> {
        let feats = Recurrent::output_feats(block)?;
        let input = &inputs[0];
        Ok(input.set_dim(-1, feats).unwrap_or_else(|| input.clone()))
    }
}
