use std::error::Error;
use std::fmt::{Display, Formatter};

use rustc_hash::FxHashMap;

use crate::propagate::Propagate;
use crate::propagators::{
    AppendFixed, Concat, Conv, FixedOutput, Group, Pool, Recurrent, Reshape, SameShape,
    SameShapes, Sequential,
};

/// Names which may not be used for block types.
const RESERVED_NAMES: [&str; 5] = ["Default", "Input", "Output", "Nested", "Shared"];

/// Registry mapping block type names to shape propagators.
///
/// New registries have no block types registered. To create a registry with
/// all built-in block types pre-registered, use [`Registry::with_builtins`].
/// Custom block types can be added with [`Registry::register`].
///
/// A registry is only read during resolution, so it can be shared between
/// threads once it is built.
#[derive(Default)]
pub struct Registry {
    propagators: FxHashMap<String, Box<dyn Propagate>>,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Create a new registry with all built-in block types registered.
    pub fn with_builtins() -> Registry {
        let mut reg = Registry::new();

        macro_rules! register {
            ($propagator:expr, $($name:literal),+) => {
                $(reg.register_or_replace($name, $propagator);)+
            };
        }

        register!(
            SameShape,
            "Identity",
            "Sigmoid",
            "LogSigmoid",
            "Softmax",
            "LogSoftmax",
            "Tanh",
            "ReLU",
            "LeakyReLU",
            "Dropout",
            "BatchNorm1d",
            "BatchNorm2d",
            "BatchNorm3d",
            "LayerNorm"
        );
        register!(SameShapes, "Add", "Multiply");
        register!(Concat, "Concatenate");

        register!(FixedOutput::features(), "Linear");
        register!(FixedOutput::adaptive_pool(1), "AdaptiveAvgPool1d", "AdaptiveMaxPool1d");
        register!(FixedOutput::adaptive_pool(2), "AdaptiveAvgPool2d", "AdaptiveMaxPool2d");
        register!(FixedOutput::adaptive_pool(3), "AdaptiveAvgPool3d", "AdaptiveMaxPool3d");
        register!(AppendFixed { fixed_dims: 1 }, "Embedding");

        register!(Conv { spatial_dims: 1 }, "Conv1d");
        register!(Conv { spatial_dims: 2 }, "Conv2d");
        register!(Conv { spatial_dims: 3 }, "Conv3d");
        register!(Pool { spatial_dims: 1 }, "MaxPool1d", "AvgPool1d");
        register!(Pool { spatial_dims: 2 }, "MaxPool2d", "AvgPool2d");
        register!(Pool { spatial_dims: 3 }, "MaxPool3d", "AvgPool3d");

        register!(Reshape, "Reshape");
        register!(Recurrent, "RNN", "LSTM", "GRU");

        register!(Sequential, "Sequential");
        register!(Group, "Group", "Module");

        reg
    }

    /// Register a propagator for a block type.
    ///
    /// Fails if `name` is already registered, reserved or not an identifier.
    pub fn register(
        &mut self,
        name: &str,
        propagator: impl Propagate + 'static,
    ) -> Result<(), RegistryError> {
        check_name(name)?;
        if self.propagators.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }
        self.propagators
            .insert(name.to_string(), Box::new(propagator));
        Ok(())
    }

    /// Register a propagator for a block type, replacing any existing one.
    ///
    /// Returns true if an existing propagator was replaced.
    pub fn register_or_replace(&mut self, name: &str, propagator: impl Propagate + 'static) -> bool {
        log::trace!("Registering block type \"{}\"", name);
        self.propagators
            .insert(name.to_string(), Box::new(propagator))
            .is_some()
    }

    /// Return the propagator for a block type.
    pub fn get(&self, name: &str) -> Option<&dyn Propagate> {
        self.propagators.get(name).map(|p| p.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.propagators.contains_key(name)
    }

    /// Return the registered block type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.propagators.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.propagators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.propagators.is_empty()
    }
}

fn check_name(name: &str) -> Result<(), RegistryError> {
    let mut chars = name.chars();
    let is_ident = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !is_ident {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(RegistryError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// Errors when registering a block type.
#[derive(Clone, Debug, PartialEq)]
pub enum RegistryError {
    /// A propagator is already registered for this name.
    AlreadyRegistered(String),
    /// The name is reserved.
    ReservedName(String),
    /// The name is not an identifier.
    InvalidName(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRegistered(name) => {
                write!(f, "block type \"{}\" is already registered", name)
            }
            Self::ReservedName(name) => write!(f, "\"{}\" is a reserved name", name),
            Self::InvalidName(name) => write!(f, "\"{}\" is not a valid block type name", name),
        }
    }
}

impl Error for RegistryError {}

#[cfg(test)]
mod tests {
    use narchi_testing::TestCases;

    use super::{Registry, RegistryError};
    use crate::architecture::Block;
    use crate::propagate::{Propagate, PropagateContext, PropagateError};
    use crate::propagators::SameShape;
    use crate::shape::{Shape, shape};

    struct Flatten;

    impl Propagate for Flatten {
        fn propagate(
            &self,
            _block: &Block,
            inputs: &[Shape],
            _ctx: &mut PropagateContext,
        ) -> Result<Shape, PropagateError> {
            let size: i64 = inputs[0].iter().filter_map(|d| d.as_value()).product();
            Ok(shape![size])
        }
    }

    #[test]
    fn test_builtins() {
        let reg = Registry::with_builtins();
        for name in [
            "ReLU",
            "Add",
            "Concatenate",
            "Linear",
            "AdaptiveAvgPool2d",
            "Embedding",
            "Conv2d",
            "MaxPool1d",
            "Reshape",
            "LSTM",
            "Sequential",
            "Group",
            "Module",
        ] {
            assert!(reg.contains(name), "missing {}", name);
        }
        assert!(reg.get("Unknown").is_none());

        let names = reg.names();
        assert!(names.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(names.len(), reg.len());
    }

    #[test]
    fn test_register() {
        #[derive(Debug)]
        struct Case {
            name: &'static str,
            expected: Result<(), RegistryError>,
        }

        let cases = [
            Case {
                name: "Flatten",
                expected: Ok(()),
            },
            Case {
                name: "ReLU",
                expected: Err(RegistryError::AlreadyRegistered("ReLU".into())),
            },
            Case {
                name: "Input",
                expected: Err(RegistryError::ReservedName("Input".into())),
            },
            Case {
                name: "Shared",
                expected: Err(RegistryError::ReservedName("Shared".into())),
            },
            Case {
                name: "2d",
                expected: Err(RegistryError::InvalidName("2d".into())),
            },
            Case {
                name: "",
                expected: Err(RegistryError::InvalidName("".into())),
            },
            Case {
                name: "my-block",
                expected: Err(RegistryError::InvalidName("my-block".into())),
            },
        ];

        cases.test_each(|case| {
            let mut reg = Registry::with_builtins();
            assert_eq!(reg.register(case.name, Flatten), case.expected);
        })
    }

    #[test]
    fn test_register_or_replace() {
        let mut reg = Registry::new();
        assert!(reg.is_empty());
        assert!(!reg.register_or_replace("Custom", SameShape));
        assert!(reg.register_or_replace("Custom", Flatten));
        assert_eq!(reg.len(), 1);
    }
}
