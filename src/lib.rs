//! narchi resolves the tensor shapes of neural network architectures.
//!
//! An architecture is a graph of blocks (convolutions, linear layers,
//! activations, reshapes, nested groups etc.) described in JSON. Given the
//! shapes of the architecture's inputs, narchi propagates shapes through
//! every block and reports the output shape of each block, or errors for
//! blocks whose inputs or configuration are inconsistent.
//!
//! # Resolving an architecture
//!
//! 1. Parse the architecture using [`Architecture::from_json`].
//! 2. Create a [`Registry`] with the block types to support, usually via
//!    [`Registry::with_builtins`].
//! 3. Resolve the architecture with [`Resolver::resolve`].
//!
//! ```
//! use narchi::{Architecture, Registry, Resolver};
//!
//! let arch = Architecture::from_json(r#"{
//!     "inputs": [{"_id": "image", "_shape": [3, 32, 32]}],
//!     "blocks": [
//!         {"_id": "conv", "_class": "Conv2d", "output_feats": 16, "kernel_size": 3},
//!         {"_id": "act", "_class": "ReLU"}
//!     ]
//! }"#).unwrap();
//!
//! let registry = Registry::with_builtins();
//! let resolution = Resolver::new(&registry).resolve(&arch);
//! assert!(resolution.is_ok());
//! assert_eq!(resolution.shape("act").unwrap().to_string(), "[16, 30, 30]");
//! ```
//!
//! # Dimensions
//!
//! Each dimension of a shape is a concrete size, a symbolic expression over
//! named variables (eg. `<<variable:2*W>>`) or the auto marker `<<auto>>`
//! for sizes which are not known. Variables declared in an architecture's
//! `_ext_vars` are substituted when they have a value and otherwise stay
//! symbolic. See [`Dim`].
//!
//! Sizes and coefficients are 64-bit integers. Arithmetic which leaves that
//! range fails the block being resolved with [`DimError::Overflow`].
//!
//! # Errors
//!
//! Resolution does not stop at the first error. Each failing block records a
//! [`ResolveError`] naming the block, with ids of blocks inside groups
//! prefixed by the group id (eg. `encoder.conv1`), and blocks which depend on
//! a failed block are skipped.
//!
//! # Custom block types
//!
//! Block types are implemented by the [`Propagate`] trait and added to a
//! registry with [`Registry::register`].

pub mod architecture;
pub mod config;
pub mod dim;
mod env;
pub mod error;
mod graph;
pub mod options;
pub mod propagate;
pub mod propagators;
pub mod ratio;
pub mod registry;
pub mod resolver;
pub mod shape;
pub mod sym_expr;

pub use architecture::{Architecture, Block, InputRef, Port};
pub use config::{Config, ConfigError, ConfigErrorKind};
pub use dim::{Dim, DimError};
pub use error::{ErrorKind, ResolveError, ResolveErrors};
pub use options::ResolveOptions;
pub use propagate::{Arity, Propagate, PropagateContext, PropagateError};
pub use registry::{Registry, RegistryError};
pub use resolver::{Resolution, ResolvedBlock, ResolvedPort, Resolver};
pub use shape::Shape;
pub use sym_expr::{SymExpr, SymbolMap};
