//! The contract implemented by shape propagators for each block type.

use std::error::Error;
use std::fmt;

use crate::architecture::{Architecture, Block};
use crate::config::ConfigError;
use crate::dim::DimError;
use crate::error::ErrorKind;
use crate::graph::ScopeSpec;
use crate::resolver::{Resolution, Resolver, ScopeEnv};
use crate::shape::Shape;
use crate::sym_expr::SymbolMap;

/// Number of input blocks accepted by a block type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    /// Exactly N inputs.
    Exact(usize),
    /// N or more inputs.
    AtLeast(usize),
    /// Between `min` and `max` inputs, inclusive.
    Range(usize, usize),
    /// Any number of inputs.
    Unbounded,
}

impl Arity {
    /// Return true if a block with `count` inputs satisfies this arity.
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => count >= min && count <= max,
            Arity::Unbounded => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
            Arity::Range(min, max) => write!(f, "between {} and {}", min, max),
            Arity::Unbounded => write!(f, "any number of"),
        }
    }
}

/// Reasons why shape propagation for a block failed.
#[derive(Clone, Debug, PartialEq)]
pub enum PropagateError {
    /// Too many or too few inputs were provided.
    IncorrectInputCount { expected: Arity, actual: usize },

    /// An input's rank does not match that required by the block type.
    IncorrectRank {
        /// Description of the expected rank, eg. "3" or "at least 2".
        expected: String,
        actual: usize,
    },

    /// Shapes which must agree do not.
    ShapeMismatch(String),

    /// Dimension arithmetic failed or produced an invalid size.
    Dimension(DimError),

    /// A configuration option is missing or invalid.
    Config(ConfigError),

    /// The block or one of its shapes is invalid for another reason.
    Invalid(String),

    /// Resolution of the nested scope of a structural block failed. The
    /// errors are reported against the nested blocks.
    NestedFailed,
}

impl PropagateError {
    pub fn rank(expected: impl fmt::Display, actual: usize) -> PropagateError {
        PropagateError::IncorrectRank {
            expected: expected.to_string(),
            actual,
        }
    }

    /// Return the category of resolution error this corresponds to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IncorrectInputCount { .. } => ErrorKind::Arity,
            Self::ShapeMismatch(_) => ErrorKind::ShapeMismatch,
            Self::Dimension(err) => err.kind(),
            Self::IncorrectRank { .. } | Self::Config(_) | Self::Invalid(_) | Self::NestedFailed => {
                ErrorKind::Validation
            }
        }
    }
}

impl fmt::Display for PropagateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncorrectInputCount { expected, actual } => {
                write!(f, "expected {} input(s), got {}", expected, actual)
            }
            Self::IncorrectRank { expected, actual } => {
                write!(f, "expected input of rank {}, got rank {}", expected, actual)
            }
            Self::ShapeMismatch(msg) => write!(f, "{}", msg),
            Self::Dimension(err) => write!(f, "{}", err),
            Self::Config(err) => write!(f, "{}", err),
            Self::Invalid(msg) => write!(f, "{}", msg),
            Self::NestedFailed => write!(f, "nested blocks failed to resolve"),
        }
    }
}

impl Error for PropagateError {}

impl From<DimError> for PropagateError {
    fn from(err: DimError) -> PropagateError {
        PropagateError::Dimension(err)
    }
}

impl From<ConfigError> for PropagateError {
    fn from(err: ConfigError) -> PropagateError {
        PropagateError::Config(err)
    }
}

/// Computes the output shape of a block from the shapes of its inputs and
/// its configuration.
///
/// Propagation of a block happens in three stages:
///
/// 1. [`initial_checks`](Propagate::initial_checks) verifies the inputs,
///    eg. the input count and ranks.
/// 2. [`propagate`](Propagate::propagate) computes the output shape.
/// 3. [`final_checks`](Propagate::final_checks) verifies the computed shape.
///
/// A failure at any stage fails only the block being resolved.
///
/// Propagators are stateless. One instance is shared by every block of a
/// given type, possibly across threads.
pub trait Propagate: Send + Sync {
    /// Return the number of inputs accepted by this block type.
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    /// Check that the inputs are acceptable for this block type.
    ///
    /// The default implementation checks the input count against
    /// [`arity`](Propagate::arity) and that each input is a valid shape of
    /// rank >= 1.
    fn initial_checks(&self, _block: &Block, inputs: &[Shape]) -> Result<(), PropagateError> {
        check_input_count(self.arity(), inputs)?;
        check_input_shapes(inputs)
    }

    /// Compute the output shape.
    fn propagate(
        &self,
        block: &Block,
        inputs: &[Shape],
        ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError>;

    /// Check the computed output shape.
    fn final_checks(&self, _block: &Block, output: &Shape) -> Result<(), PropagateError> {
        if output.ndim() == 0 {
            return Err(PropagateError::Invalid("output shape is empty".into()));
        }
        output.validate()?;
        Ok(())
    }
}

/// Check the number of inputs against an arity.
pub fn check_input_count(arity: Arity, inputs: &[Shape]) -> Result<(), PropagateError> {
    if arity.accepts(inputs.len()) {
        Ok(())
    } else {
        Err(PropagateError::IncorrectInputCount {
            expected: arity,
            actual: inputs.len(),
        })
    }
}

/// Check that each input has rank >= 1 and only valid dimensions.
pub fn check_input_shapes(inputs: &[Shape]) -> Result<(), PropagateError> {
    for shape in inputs {
        if shape.ndim() == 0 {
            return Err(PropagateError::rank("at least 1", 0));
        }
        shape.validate()?;
    }
    Ok(())
}

/// Run all propagation stages for a block.
pub(crate) fn run_stages(
    propagator: &dyn Propagate,
    block: &Block,
    inputs: &[Shape],
    ctx: &mut PropagateContext,
) -> Result<Shape, PropagateError> {
    propagator.initial_checks(block, inputs)?;
    let output = propagator.propagate(block, inputs, ctx)?;
    propagator.final_checks(block, &output)?;
    Ok(output)
}

/// State available to a propagator while it resolves one block.
///
/// Structural block types (eg. groups) use the context to resolve their
/// nested blocks. The result of nested resolution is kept in the context and
/// recorded against the block once propagation finishes.
pub struct PropagateContext<'a> {
    resolver: &'a Resolver<'a>,
    env: &'a ScopeEnv,
    nested: Option<Resolution>,
}

impl<'a> PropagateContext<'a> {
    pub(crate) fn new(resolver: &'a Resolver<'a>, env: &'a ScopeEnv) -> Self {
        PropagateContext {
            resolver,
            env,
            nested: None,
        }
    }

    /// Values of the external variables bound in the current scope.
    pub fn symbols(&self) -> &SymbolMap {
        &self.env.symbols
    }

    /// Return the environment for a scope nested in the current one.
    fn nested_env(&self, overrides: &SymbolMap) -> Result<ScopeEnv, PropagateError> {
        let max_depth = self.resolver.options().max_depth;
        if self.env.depth + 1 > max_depth {
            return Err(PropagateError::Invalid(format!(
                "nesting depth exceeds the maximum of {}",
                max_depth
            )));
        }
        Ok(self.env.nested(overrides))
    }

    /// Resolve a list of blocks which are chained one after another. The
    /// first block receives `inputs`.
    pub fn resolve_sequence(
        &mut self,
        id: &str,
        blocks: &[Block],
        inputs: &[Shape],
    ) -> Result<&Resolution, PropagateError> {
        let env = self.nested_env(&SymbolMap::default())?;
        let spec = ScopeSpec::sequence(id, blocks, inputs);
        let resolution = self.resolver.resolve_scope(spec, &env);
        Ok(self.nested.insert(resolution))
    }

    /// Resolve a nested architecture whose declared inputs are bound, in
    /// order, to `inputs`.
    ///
    /// `vars` overrides the values of external variables in the nested
    /// scope.
    pub fn resolve_architecture(
        &mut self,
        id: &str,
        body: &Architecture,
        inputs: &[Shape],
        vars: &SymbolMap,
    ) -> Result<&Resolution, PropagateError> {
        let mut overrides = body.bound_vars();
        overrides.extend(vars.iter().map(|(k, v)| (k.clone(), *v)));
        let mut env = self.nested_env(&overrides)?;
        env.declare(body.ext_vars.keys());
        let spec = ScopeSpec::architecture(id, body, inputs);
        let resolution = self.resolver.resolve_scope(spec, &env);
        Ok(self.nested.insert(resolution))
    }

    pub(crate) fn take_nested(&mut self) -> Option<Resolution> {
        self.nested.take()
    }
}
