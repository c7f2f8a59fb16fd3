use serde_json::Value;

use crate::architecture::{Architecture, Block};
use crate::config::ConfigError;
use crate::propagate::{
    Arity, Propagate, PropagateContext, PropagateError, check_input_count, check_input_shapes,
};
use crate::shape::Shape;
use crate::sym_expr::SymbolMap;

const VARS_KEY: &str = "_ext_vars";

/// Blocks whose children, in `blocks`, are applied one after another.
///
/// The first child receives the inputs of the block and the output is the
/// output of the last child. Children are resolved in a nested scope, so
/// errors are reported against `<block>.<child>`.
pub struct Sequential;

impl Propagate for Sequential {
    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }

    fn initial_checks(&self, block: &Block, inputs: &[Shape]) -> Result<(), PropagateError> {
        check_input_count(self.arity(), inputs)?;
        check_input_shapes(inputs)?;
        if block.blocks.is_empty() {
            return Err(PropagateError::Invalid("block has no child blocks".into()));
        }
        Ok(())
    }

    fn propagate(
        &self,
        block: &Block,
        inputs: &[Shape],
        ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError> {
        let nested = ctx.resolve_sequence(&block.id, &block.blocks, inputs)?;
        nested
            .output_shape()
            .cloned()
            .ok_or(PropagateError::NestedFailed)
    }
}

/// Blocks (`Group`, `Module`) containing a nested architecture.
///
/// The inputs of the block are bound in order to the declared inputs of the
/// nested architecture and the output is its first output. The block may
/// set `_ext_vars` to give values for variables of the nested architecture.
/// These replace the defaults of the nested architecture, but not values
/// passed to [`Resolver::resolve_with_vars`](crate::Resolver::resolve_with_vars).
///
/// A variable in a declared input shape, eg. `H` in `[H, 8]`, is bound
/// only to a concrete size from the enclosing scope. Variables can only be
/// bound to integers, so an input of symbolic size such as `[L, 8]` does
/// not match `[H, 8]` and fails with a shape mismatch. Declare the input
/// with the enclosing scope's variable (`[L, 8]`) to pass symbolic sizes
/// through.
pub struct Group;

impl Group {
    fn body(block: &Block) -> Result<&Architecture, PropagateError> {
        block
            .architecture
            .as_deref()
            .ok_or_else(|| PropagateError::Invalid("block has no architecture".into()))
    }

    fn vars(block: &Block) -> Result<SymbolMap, ConfigError> {
        let Some(value) = block.config.get(VARS_KEY) else {
            return Ok(SymbolMap::default());
        };
        let Value::Object(vars) = value else {
            return Err(ConfigError::invalid_value(
                VARS_KEY,
                "expected an object mapping names to sizes",
            ));
        };

        let mut symbols = SymbolMap::default();
        for (name, val) in vars {
            match val {
                Value::Null => {}
                Value::Number(num) => {
                    let size = num.as_i64().ok_or_else(|| {
                        ConfigError::invalid_value(VARS_KEY, format!("\"{}\" is not an integer", name))
                    })?;
                    symbols.insert(name.clone(), size);
                }
                _ => {
                    return Err(ConfigError::invalid_value(
                        VARS_KEY,
                        format!("\"{}\" is not an integer or null", name),
                    ));
                }
            }
        }
        Ok(symbols)
    }
}

impl Propagate for Group {
    fn arity(&self) -> Arity {
        Arity::Unbounded
    }

    fn initial_checks(&self, block: &Block, inputs: &[Shape]) -> Result<(), PropagateError> {
        let body = Group::body(block)?;
        check_input_count(Arity::Exact(body.inputs.len()), inputs)?;
        check_input_shapes(inputs)?;
        Group::vars(block)?;
        Ok(())
    }

    fn propagate(
        &self,
        block: &Block,
        inputs: &[Shape],
        ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError> {
        let body = Group::body(block)?;
        let vars = Group::vars(block)?;
        let nested = ctx.resolve_architecture(&block.id, body, inputs, &vars)?;
        nested
            .output_shape()
            .cloned()
            .ok_or(PropagateError::NestedFailed)
    }
}
