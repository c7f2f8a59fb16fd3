//! Structure of a single scope: connections between blocks and evaluation
//! order.
//!
//! This is computed in a pre-pass before any block in the scope is
//! propagated. Errors found here make the evaluation order undefined, so they
//! abort resolution of the whole scope.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::architecture::{Architecture, Block, InputRef, Port};
use crate::error::{ErrorKind, ResolveError};
use crate::shape::Shape;

/// Separator between the nodes of a `graph` line.
const EDGE: &str = "->";

/// A declared input of a scope.
pub(crate) struct InputSpec<'a> {
    /// Port id. Inputs of `Sequential` blocks have no id and can only be
    /// referenced by position.
    pub id: &'a str,
    /// Shape declared by the scope.
    pub declared: Option<&'a Shape>,
    /// Shape supplied by the enclosing scope.
    pub given: Option<&'a Shape>,
}

/// Description of a scope to resolve.
pub(crate) struct ScopeSpec<'a> {
    pub id: &'a str,
    pub inputs: Vec<InputSpec<'a>>,
    pub blocks: &'a [Block],
    pub block_ids: Vec<String>,
    pub graph: &'a [String],
    pub outputs: &'a [Port],
}

impl<'a> ScopeSpec<'a> {
    /// Scope for a top-level architecture, whose inputs are declared.
    pub fn top_level(arch: &'a Architecture) -> Self {
        Self::architecture(&arch.id, arch, &[])
    }

    /// Scope for the body of a group. Declared inputs are bound in order to
    /// `given`.
    pub fn architecture(id: &'a str, arch: &'a Architecture, given: &'a [Shape]) -> Self {
        let inputs = arch
            .inputs
            .iter()
            .enumerate()
            .map(|(i, port)| InputSpec {
                id: &port.id,
                declared: port.shape.as_ref(),
                given: given.get(i),
            })
            .collect();
        ScopeSpec {
            id,
            inputs,
            blocks: &arch.blocks,
            block_ids: block_ids(&arch.blocks),
            graph: &arch.graph,
            outputs: &arch.outputs,
        }
    }

    /// Scope for the children of a `Sequential` block.
    pub fn sequence(id: &'a str, blocks: &'a [Block], given: &'a [Shape]) -> Self {
        let inputs = given
            .iter()
            .map(|shape| InputSpec {
                id: "",
                declared: None,
                given: Some(shape),
            })
            .collect();
        ScopeSpec {
            id,
            inputs,
            blocks,
            block_ids: block_ids(blocks),
            graph: &[],
            outputs: &[],
        }
    }
}

/// Return the ids of blocks in a scope. Blocks without an id are identified
/// by their position.
fn block_ids(blocks: &[Block]) -> Vec<String> {
    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| {
            if block.id.is_empty() {
                i.to_string()
            } else {
                block.id.clone()
            }
        })
        .collect()
}

/// Source of a value within a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Node {
    /// The n'th declared input of the scope.
    Input(usize),
    /// The output of the n'th block of the scope.
    Block(usize),
}

/// Target of a name within a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Name {
    Node(Node),
    Output(usize),
}

/// Connections and evaluation order of the blocks in a scope.
#[derive(Debug, PartialEq)]
pub(crate) struct ScopeGraph {
    /// Sources of each block's inputs, in order.
    pub block_inputs: Vec<Vec<Node>>,
    /// Source of each declared output of the scope. If the scope has no
    /// declared outputs this has one entry for its last block.
    pub output_sources: Vec<Node>,
    /// Indices of blocks in evaluation order.
    pub order: Vec<usize>,
}

/// Split a graph line such as `a -> b -> c` into node ids.
pub(crate) fn parse_graph_line(line: &str) -> Result<Vec<&str>, String> {
    let ids: Vec<&str> = line.split(EDGE).map(|id| id.trim()).collect();
    if ids.len() < 2 {
        return Err(format!("graph line \"{}\" has no edges", line));
    }
    if ids.iter().any(|id| id.is_empty()) {
        return Err(format!("graph line \"{}\" has an empty node id", line));
    }
    Ok(ids)
}

/// Connect the blocks of a scope and sort them into evaluation order.
///
/// Returns every reference error found, or a single cycle error.
pub(crate) fn build_scope_graph(spec: &ScopeSpec) -> Result<ScopeGraph, Vec<ResolveError>> {
    let mut errors = Vec::new();
    let reference = |id: &str, msg: String| ResolveError::new(id, ErrorKind::Reference, msg);

    // Index every name in scope.
    let mut names: FxHashMap<&str, Name> = FxHashMap::default();
    let named = spec
        .inputs
        .iter()
        .enumerate()
        .filter(|(_, input)| !input.id.is_empty())
        .map(|(i, input)| (input.id, Name::Node(Node::Input(i))))
        .chain(
            spec.block_ids
                .iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), Name::Node(Node::Block(i)))),
        )
        .chain(
            spec.outputs
                .iter()
                .enumerate()
                .map(|(i, port)| (port.id.as_str(), Name::Output(i))),
        );
    for (id, name) in named {
        if names.insert(id, name).is_some() {
            errors.push(reference(id, format!("id \"{}\" is not unique in scope", id)));
        }
    }

    // Collect edges from graph lines.
    let mut graph_inputs: Vec<Vec<Node>> = vec![Vec::new(); spec.blocks.len()];
    let mut graph_outputs: Vec<Option<Node>> = vec![None; spec.outputs.len()];
    for line in spec.graph {
        let ids = match parse_graph_line(line) {
            Ok(ids) => ids,
            Err(msg) => {
                errors.push(reference(spec.id, msg));
                continue;
            }
        };
        for edge in ids.windows(2) {
            let &[from, to] = edge else {
                continue;
            };
            let source = match names.get(from) {
                Some(Name::Node(node)) => *node,
                Some(Name::Output(_)) => {
                    errors.push(reference(from, format!("output \"{}\" used as a source", from)));
                    continue;
                }
                None => {
                    errors.push(reference(from, format!("unknown id \"{}\" in graph", from)));
                    continue;
                }
            };
            match names.get(to) {
                Some(Name::Node(Node::Block(idx))) => graph_inputs[*idx].push(source),
                Some(Name::Output(idx)) => {
                    if graph_outputs[*idx].replace(source).is_some() {
                        errors.push(reference(to, format!("output \"{}\" has multiple sources", to)));
                    }
                }
                Some(Name::Node(Node::Input(_))) => {
                    errors.push(reference(to, format!("input \"{}\" used as a target", to)));
                }
                None => {
                    errors.push(reference(to, format!("unknown id \"{}\" in graph", to)));
                }
            }
        }
    }

    // Resolve the inputs of each block.
    let mut block_inputs = Vec::with_capacity(spec.blocks.len());
    for (i, (block, from_graph)) in spec.blocks.iter().zip(graph_inputs).enumerate() {
        let id = spec.block_ids[i].as_str();
        let mut inputs = Vec::with_capacity(block.inputs.len() + from_graph.len());
        for input in &block.inputs {
            match input {
                InputRef::Id(name) => match names.get(name.as_str()) {
                    Some(Name::Node(node)) => inputs.push(*node),
                    Some(Name::Output(_)) => {
                        errors.push(reference(id, format!("output \"{}\" used as an input", name)))
                    }
                    None => errors.push(reference(id, format!("unknown input \"{}\"", name))),
                },
                InputRef::Input { input } if *input < spec.inputs.len() => {
                    inputs.push(Node::Input(*input))
                }
                InputRef::Input { input } => errors.push(reference(
                    id,
                    format!(
                        "input {} is out of range for a scope with {} input(s)",
                        input,
                        spec.inputs.len()
                    ),
                )),
            }
        }
        inputs.extend(from_graph);

        if inputs.is_empty() && block.inputs.is_empty() {
            if !spec.graph.is_empty() {
                errors.push(reference(id, "block is not connected in graph".to_string()));
            } else if i > 0 {
                inputs.push(Node::Block(i - 1));
            } else if spec.inputs.is_empty() {
                errors.push(reference(id, "scope has no inputs".to_string()));
            } else {
                inputs.extend((0..spec.inputs.len()).map(Node::Input));
            }
        }
        block_inputs.push(inputs);
    }

    // Resolve output sources.
    let terminal = match spec.blocks.len() {
        0 if spec.inputs.is_empty() => None,
        0 => Some(Node::Input(0)),
        n => Some(Node::Block(n - 1)),
    };
    let mut output_sources = Vec::with_capacity(spec.outputs.len().max(1));
    for (port, from_graph) in spec.outputs.iter().zip(graph_outputs) {
        let source = match &port.source {
            Some(name) => match names.get(name.as_str()) {
                Some(Name::Node(node)) => Some(*node),
                _ => {
                    errors.push(reference(&port.id, format!("unknown source \"{}\"", name)));
                    continue;
                }
            },
            None => from_graph.or(terminal),
        };
        match source {
            Some(node) => output_sources.push(node),
            None => errors.push(reference(&port.id, "output has no source".to_string())),
        }
    }
    if spec.outputs.is_empty() {
        match terminal {
            Some(node) => output_sources.push(node),
            None => errors.push(reference(spec.id, "scope has no blocks".to_string())),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let order = sort_blocks(&block_inputs).map_err(|idx| {
        vec![ResolveError::new(
            &spec.block_ids[idx],
            ErrorKind::Cycle,
            "block depends on its own output",
        )]
    })?;

    Ok(ScopeGraph {
        block_inputs,
        output_sources,
        order,
    })
}

/// Sort blocks so each block comes after the blocks it depends on.
///
/// Among blocks whose dependencies are satisfied, the one declared first is
/// chosen. If the dependencies contain a cycle, returns the index of a block
/// on the cycle.
pub(crate) fn sort_blocks(block_inputs: &[Vec<Node>]) -> Result<Vec<usize>, usize> {
    let deps = |idx: usize| {
        block_inputs[idx].iter().filter_map(|node| match node {
            Node::Block(dep) => Some(*dep),
            Node::Input(_) => None,
        })
    };

    // Map of block to blocks that depend on it.
    let mut dependents: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for idx in 0..block_inputs.len() {
        for dep in deps(idx) {
            dependents.entry(dep).or_default().push(idx);
        }
    }

    let mut resolved: FxHashSet<usize> = FxHashSet::default();
    let mut frontier: Vec<usize> = (0..block_inputs.len())
        .filter(|idx| deps(*idx).next().is_none())
        .collect();
    let mut order = Vec::with_capacity(block_inputs.len());

    while let Some(pos) = frontier
        .iter()
        .enumerate()
        .min_by_key(|(_, idx)| **idx)
        .map(|(pos, _)| pos)
    {
        let next = frontier.remove(pos);
        order.push(next);
        resolved.insert(next);

        let Some(candidates) = dependents.get(&next) else {
            continue;
        };
        for &candidate in candidates {
            if resolved.contains(&candidate) || frontier.contains(&candidate) {
                continue;
            }
            if deps(candidate).all(|dep| resolved.contains(&dep)) {
                frontier.push(candidate);
            }
        }
    }

    if order.len() == block_inputs.len() {
        return Ok(order);
    }

    // Walk back along unresolved dependencies from the first unsorted block
    // until a block repeats. That block is on a cycle.
    let Some(mut current) = (0..block_inputs.len()).find(|idx| !resolved.contains(idx)) else {
        return Ok(order);
    };
    let mut visited = FxHashSet::default();
    while visited.insert(current) {
        match deps(current).find(|dep| !resolved.contains(dep)) {
            Some(dep) => current = dep,
            None => break,
        }
    }
    Err(current)
}
