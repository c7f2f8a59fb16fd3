//! Declarative description of an architecture as a graph of blocks.
//!
//! These types mirror the JSON form of an architecture:
//!
//! ```json
//! {
//!   "_id": "classifier",
//!   "_ext_vars": {"W": null},
//!   "inputs": [{"_id": "image", "_shape": [3, 32, "<<variable:W>>"]}],
//!   "outputs": [{"_id": "logits", "_shape": ["<<auto>>"]}],
//!   "blocks": [
//!     {"_id": "conv", "_class": "Conv2d", "output_feats": 8, "kernel_size": 3},
//!     {"_id": "pool", "_class": "AdaptiveAvgPool2d", "output_feats": 1},
//!     {"_id": "flat", "_class": "Reshape", "reshape_spec": "flatten"},
//!     {"_id": "fc", "_class": "Linear", "output_feats": 10}
//!   ],
//!   "graph": ["image -> conv -> pool -> flat -> fc -> logits"]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::shape::Shape;
use crate::sym_expr::SymbolMap;

/// Reference to the source of one of a block's inputs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputRef {
    /// Id of a block or declared input in the same scope.
    Id(String),
    /// Position of one of the declared inputs of the enclosing scope.
    Input { input: usize },
}

/// A declared input or output of an architecture.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Port {
    #[serde(rename = "_id")]
    pub id: String,

    /// Declared shape. Output shapes may contain auto dimensions, which are
    /// filled in from the block that produces the output.
    #[serde(rename = "_shape", default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Shape>,

    /// For outputs, the id of the block which produces the output.
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(rename = "_description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One node in an architecture graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Id which is unique within the enclosing scope.
    ///
    /// Children of a `Sequential` block may omit the id, in which case their
    /// position is used.
    #[serde(rename = "_id", default)]
    pub id: String,

    /// Block type, used to look up the propagator for the block.
    #[serde(rename = "_class")]
    pub kind: String,

    #[serde(rename = "_inputs", default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputRef>,

    #[serde(rename = "_description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Children of a `Sequential` block.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,

    /// Body of a `Group` or `Module` block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Box<Architecture>>,

    #[serde(flatten)]
    pub config: Config,
}

impl Block {
    pub fn new(id: &str, kind: &str) -> Block {
        Block {
            id: id.to_string(),
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    /// Set the configuration of this block.
    pub fn with_config(mut self, config: Config) -> Block {
        self.config = config;
        self
    }
}

/// Named graph of blocks with declared inputs, outputs and variables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    #[serde(rename = "_id", default)]
    pub id: String,

    #[serde(rename = "_description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// External variables usable in dimension expressions. Variables with
    /// a `null` value are left symbolic.
    #[serde(rename = "_ext_vars", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ext_vars: BTreeMap<String, Option<i64>>,

    #[serde(default)]
    pub inputs: Vec<Port>,

    #[serde(default)]
    pub outputs: Vec<Port>,

    #[serde(default)]
    pub blocks: Vec<Block>,

    /// Connections between blocks, in the form `"a -> b -> c"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub graph: Vec<String>,
}

impl Architecture {
    /// Parse an architecture from its JSON form.
    pub fn from_json(json: &str) -> Result<Architecture, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Return the external variables which have a value.
    pub fn bound_vars(&self) -> SymbolMap {
        self.ext_vars
            .iter()
            .filter_map(|(name, val)| val.map(|v| (name.clone(), v)))
            .collect()
    }
}
