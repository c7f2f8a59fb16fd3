use crate::env::env_flag;

/// Default limit on the nesting depth of groups.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Options which control shape resolution.
///
/// The default values of some options can be overridden using environment
/// variables:
///
/// - `NARCHI_STRICT_VARIABLES` - Sets [`strict_variables`](Self::strict_variables)
/// - `NARCHI_VERBOSE` - Sets [`verbose`](Self::verbose)
///
/// Environment variables accept `1`, `true`, `yes` or `on` to enable a flag
/// and `0`, `false`, `no` or `off` to disable it.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolveOptions {
    /// Report an error if a shape contains a variable which is not declared
    /// in the `_ext_vars` of an enclosing architecture.
    pub strict_variables: bool,

    /// Maximum nesting depth of group and sequential blocks.
    pub max_depth: usize,

    /// Log the resolved shape of each block at info level.
    pub verbose: bool,
}

impl ResolveOptions {
    /// Options with fixed defaults, ignoring environment variables.
    pub fn new() -> ResolveOptions {
        ResolveOptions {
            strict_variables: false,
            max_depth: DEFAULT_MAX_DEPTH,
            verbose: false,
        }
    }

    /// Default options, with overrides from environment variables.
    pub fn from_env() -> ResolveOptions {
        let defaults = ResolveOptions::new();
        ResolveOptions {
            strict_variables: env_flag("NARCHI_STRICT_VARIABLES", defaults.strict_variables),
            verbose: env_flag("NARCHI_VERBOSE", defaults.verbose),
            ..defaults
        }
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::from_env()
    }
}
