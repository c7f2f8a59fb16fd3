//! Resolution of the shapes of every block in an architecture.

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::architecture::Architecture;
use crate::dim::Dim;
use crate::error::{ErrorKind, PATH_SEPARATOR, ResolveError, ResolveErrors};
use crate::graph::{InputSpec, Node, ScopeSpec, build_scope_graph};
use crate::options::ResolveOptions;
use crate::propagate::{PropagateContext, PropagateError, run_stages};
use crate::registry::Registry;
use crate::shape::Shape;
use crate::sym_expr::{SymExpr, SymbolMap};

/// Variables visible while resolving one scope.
#[derive(Clone, Debug, Default)]
pub(crate) struct ScopeEnv {
    /// Values of bound variables.
    pub symbols: SymbolMap,
    /// Names of all declared variables, bound or not.
    pub declared: FxHashSet<String>,
    /// Values supplied by the caller of the resolver. These take precedence
    /// over `_ext_vars` at every nesting level.
    pub pinned: SymbolMap,
    /// Number of scopes enclosing this one.
    pub depth: usize,
}

impl ScopeEnv {
    pub fn new(symbols: SymbolMap) -> ScopeEnv {
        let declared = symbols.keys().cloned().collect();
        ScopeEnv {
            symbols,
            declared,
            pinned: SymbolMap::default(),
            depth: 0,
        }
    }

    /// Bind caller-supplied variable values.
    pub fn pin(&mut self, vars: &SymbolMap) {
        for (name, val) in vars {
            self.bind(name, *val);
            self.pinned.insert(name.clone(), *val);
        }
    }

    /// Create the environment for a nested scope, with `overrides` replacing
    /// the values of variables from this scope. Pinned values are not
    /// overridden.
    pub fn nested(&self, overrides: &SymbolMap) -> ScopeEnv {
        let mut env = self.clone();
        env.depth += 1;
        for (name, val) in overrides.iter().chain(&self.pinned) {
            env.bind(name, *val);
        }
        env
    }

    pub fn declare<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        self.declared.extend(names.into_iter().cloned());
    }

    fn bind(&mut self, name: &str, value: i64) {
        self.symbols.insert(name.to_string(), value);
        self.declared.insert(name.to_string());
    }
}

/// Return the variable name if `dim` is a single variable, eg. `W`.
fn as_symbol(dim: &Dim) -> Option<&str> {
    let expr = dim.as_expr()?;
    let mut symbols = expr.symbols().into_iter();
    let name = symbols.next()?;
    (symbols.next().is_none() && *expr == SymExpr::var(name)).then_some(name)
}

/// Resolves the shapes of blocks in architectures.
///
/// A resolver uses a [`Registry`] to find the propagator for each block
/// type. The registry is only read during resolution, so one registry can be
/// shared by many resolvers and resolutions can run concurrently.
pub struct Resolver<'a> {
    registry: &'a Registry,
    options: ResolveOptions,
}

impl<'a> Resolver<'a> {
    /// Create a resolver with default options.
    ///
    /// See [`ResolveOptions::default`].
    pub fn new(registry: &'a Registry) -> Self {
        Self::with_options(registry, ResolveOptions::default())
    }

    pub fn with_options(registry: &'a Registry, options: ResolveOptions) -> Self {
        Resolver { registry, options }
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Resolve the shape of every block in an architecture.
    ///
    /// Resolution does not stop at the first failing block. Errors are
    /// collected in the returned [`Resolution`] and blocks which do not
    /// depend on a failed block are still resolved.
    pub fn resolve(&self, arch: &Architecture) -> Resolution {
        self.resolve_with_vars(arch, &SymbolMap::default())
    }

    /// Resolve an architecture with values for some of its variables.
    ///
    /// `vars` takes precedence over values given in the architecture's
    /// `_ext_vars`.
    pub fn resolve_with_vars(&self, arch: &Architecture, vars: &SymbolMap) -> Resolution {
        let mut env = ScopeEnv::new(arch.bound_vars());
        env.declare(arch.ext_vars.keys());
        env.pin(vars);

        let resolution = self.resolve_scope(ScopeSpec::top_level(arch), &env);
        if resolution.is_ok() {
            log::debug!("Resolved architecture \"{}\"", arch.id);
        } else {
            log::debug!(
                "Architecture \"{}\" has {} error(s)",
                arch.id,
                resolution.errors.len()
            );
        }
        resolution
    }

    /// Resolve several architectures in parallel.
    pub fn resolve_all(&self, archs: &[Architecture]) -> Vec<Resolution> {
        archs.par_iter().map(|arch| self.resolve(arch)).collect()
    }

    /// Resolve the blocks of one scope.
    pub(crate) fn resolve_scope(&self, spec: ScopeSpec, env: &ScopeEnv) -> Resolution {
        log::debug!(
            "Resolving scope \"{}\" with {} block(s) at depth {}",
            spec.id,
            spec.blocks.len(),
            env.depth
        );

        let mut env = env.clone();
        let mut res = Resolution {
            id: spec.id.to_string(),
            ..Default::default()
        };

        let input_shapes: Vec<Option<Shape>> = spec
            .inputs
            .iter()
            .map(|input| self.bind_input(input, &mut env, &mut res.errors))
            .collect();
        res.inputs = spec
            .inputs
            .iter()
            .zip(&input_shapes)
            .map(|(input, shape)| ResolvedPort {
                id: input.id.to_string(),
                shape: shape.clone(),
            })
            .collect();

        // Check structure before running any propagator.
        let unknown_types: Vec<ResolveError> = spec
            .blocks
            .iter()
            .zip(&spec.block_ids)
            .filter(|(block, _)| self.registry.get(&block.kind).is_none())
            .map(|(block, id)| {
                ResolveError::new(
                    id,
                    ErrorKind::UnknownType,
                    format!("unknown block type \"{}\"", block.kind),
                )
            })
            .collect();
        let graph = match build_scope_graph(&spec) {
            Ok(graph) if unknown_types.is_empty() => graph,
            Ok(_) => {
                res.errors.extend(unknown_types);
                return res;
            }
            Err(errors) => {
                res.errors.extend(errors);
                res.errors.extend(unknown_types);
                return res;
            }
        };

        res.order = graph
            .order
            .iter()
            .map(|idx| spec.block_ids[*idx].clone())
            .collect();
        log::trace!("Evaluation order of \"{}\": {:?}", spec.id, res.order);

        let mut shapes: Vec<Option<Shape>> = vec![None; spec.blocks.len()];
        let mut blocks: Vec<Option<ResolvedBlock>> = vec![None; spec.blocks.len()];
        let node_shape = |node: &Node, shapes: &[Option<Shape>]| match node {
            Node::Input(idx) => input_shapes[*idx].clone(),
            Node::Block(idx) => shapes[*idx].clone(),
        };

        for &idx in &graph.order {
            let block = &spec.blocks[idx];
            let id = spec.block_ids[idx].as_str();
            let inputs: Option<Vec<Shape>> = graph.block_inputs[idx]
                .iter()
                .map(|node| node_shape(node, &shapes))
                .collect();

            let Some(inputs) = inputs else {
                log::debug!("Skipping block \"{}\" with unresolved inputs", id);
                blocks[idx] = Some(ResolvedBlock::new(id, &block.kind, Vec::new()));
                continue;
            };
            let Some(propagator) = self.registry.get(&block.kind) else {
                continue;
            };

            let mut ctx = PropagateContext::new(self, &env);
            let result = run_stages(propagator, block, &inputs, &mut ctx);
            let nested = ctx.take_nested();

            let nested_errors = nested.as_ref().map(|n| n.errors.len()).unwrap_or(0);
            if let Some(nested) = &nested {
                res.errors
                    .extend(nested.errors.iter().cloned().map(|err| err.in_block(id)));
            }

            let shape = match result {
                Ok(shape) => match shape.substitute(&env.symbols) {
                    Ok(shape) => match self.undeclared_var(&shape, &env) {
                        Some(name) => {
                            res.errors.push(ResolveError::new(
                                id,
                                ErrorKind::Validation,
                                format!("output shape {} uses undeclared variable \"{}\"", shape, name),
                            ));
                            None
                        }
                        None => Some(shape),
                    },
                    Err(err) => {
                        res.errors
                            .push(ResolveError::new(id, err.kind(), err.to_string()));
                        None
                    }
                },
                Err(PropagateError::NestedFailed) if nested_errors > 0 => None,
                Err(err) => {
                    res.errors
                        .push(ResolveError::new(id, err.kind(), err.to_string()));
                    None
                }
            };

            match &shape {
                Some(shape) if self.options.verbose => {
                    log::info!("Block \"{}\" ({}): {}", id, block.kind, shape)
                }
                Some(shape) => log::debug!("Block \"{}\" ({}): {}", id, block.kind, shape),
                None => log::debug!("Block \"{}\" ({}) failed to resolve", id, block.kind),
            }

            shapes[idx] = shape.clone();
            blocks[idx] = Some(ResolvedBlock {
                shape,
                nested: nested.map(Box::new),
                ..ResolvedBlock::new(id, &block.kind, inputs)
            });
        }
        res.blocks = blocks.into_iter().flatten().collect();

        for (i, source) in graph.output_sources.iter().enumerate() {
            let port = spec.outputs.get(i);
            let id = port.map(|p| p.id.as_str()).unwrap_or_default();
            let shape = match (node_shape(source, &shapes), port.and_then(|p| p.shape.as_ref())) {
                (None, _) => None,
                (Some(shape), None) => Some(shape),
                (Some(shape), Some(declared)) => match declared.substitute(&env.symbols) {
                    Ok(declared) if declared.agrees_with(&shape, &env.symbols) => {
                        Some(declared.fill_auto(&shape))
                    }
                    Ok(declared) => {
                        res.errors.push(ResolveError::new(
                            id,
                            ErrorKind::ShapeMismatch,
                            format!(
                                "declared shape {} does not match resolved shape {}",
                                declared, shape
                            ),
                        ));
                        None
                    }
                    Err(err) => {
                        res.errors
                            .push(ResolveError::new(id, err.kind(), err.to_string()));
                        None
                    }
                },
            };
            res.outputs.push(ResolvedPort {
                id: id.to_string(),
                shape,
            });
        }

        res
    }

    /// Determine the shape of a declared input of a scope.
    fn bind_input(
        &self,
        input: &InputSpec,
        env: &mut ScopeEnv,
        errors: &mut Vec<ResolveError>,
    ) -> Option<Shape> {
        let id = input.id;
        let Some(declared) = input.declared else {
            if input.given.is_none() {
                errors.push(ResolveError::new(
                    id,
                    ErrorKind::Validation,
                    "input has no shape",
                ));
            }
            return input.given.cloned();
        };

        // Bind unbound variables in the declared shape to concrete sizes
        // from the enclosing scope.
        if let Some(given) = input.given
            && given.ndim() == declared.ndim()
        {
            for (dim, size) in declared.iter().zip(given.iter()) {
                if let Some(name) = as_symbol(dim)
                    && !env.symbols.contains_key(name)
                    && let Some(size) = size.as_value()
                {
                    env.bind(name, size);
                }
            }
        }

        let declared = match declared
            .substitute(&env.symbols)
            .and_then(|shape| shape.validate().map(|_| shape))
        {
            Ok(declared) => declared,
            Err(err) => {
                errors.push(ResolveError::new(id, err.kind(), err.to_string()));
                return None;
            }
        };
        if let Some(name) = self.undeclared_var(&declared, env) {
            errors.push(ResolveError::new(
                id,
                ErrorKind::Validation,
                format!("shape {} uses undeclared variable \"{}\"", declared, name),
            ));
            return None;
        }

        match input.given {
            None => Some(declared),
            Some(given) if declared.agrees_with(given, &env.symbols) => {
                Some(declared.fill_auto(given))
            }
            Some(given) => {
                errors.push(ResolveError::new(
                    id,
                    ErrorKind::ShapeMismatch,
                    format!(
                        "declared shape {} does not match input shape {}",
                        declared, given
                    ),
                ));
                None
            }
        }
    }

    /// If strict variable checking is enabled, return the first variable in
    /// `shape` that is not declared.
    fn undeclared_var(&self, shape: &Shape, env: &ScopeEnv) -> Option<String> {
        if !self.options.strict_variables {
            return None;
        }
        shape
            .iter()
            .filter_map(|dim| dim.as_expr())
            .flat_map(|expr| expr.symbols())
            .find(|name| !env.declared.contains(*name))
            .map(|name| name.to_string())
    }
}

/// Resolved shape of a declared input or output of a scope.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedPort {
    #[serde(rename = "_id")]
    pub id: String,

    /// Resolved shape, or `None` if resolution failed.
    #[serde(rename = "_shape", skip_serializing_if = "Option::is_none")]
    pub shape: Option<Shape>,
}

/// Result of resolving one block.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedBlock {
    pub id: String,
    pub kind: String,

    /// Shapes of the block's inputs. Empty if an input failed to resolve.
    pub input_shapes: Vec<Shape>,

    /// Output shape, or `None` if the block or one of its inputs failed.
    pub shape: Option<Shape>,

    /// Resolution of the blocks nested inside a group or sequential block.
    pub nested: Option<Box<Resolution>>,
}

impl ResolvedBlock {
    fn new(id: &str, kind: &str, input_shapes: Vec<Shape>) -> ResolvedBlock {
        ResolvedBlock {
            id: id.to_string(),
            kind: kind.to_string(),
            input_shapes,
            shape: None,
            nested: None,
        }
    }
}

/// Serializes as `{"_id", "_class", "_shape": {"in", "out"}}`, plus the
/// nested architecture for structural blocks. `in` is a single shape for
/// blocks with one input and a list of shapes otherwise.
impl Serialize for ResolvedBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(untagged)]
        enum InShapes<'a> {
            One(&'a Shape),
            Many(&'a [Shape]),
        }

        #[derive(Serialize)]
        struct BlockShape<'a> {
            #[serde(rename = "in")]
            input: InShapes<'a>,
            #[serde(skip_serializing_if = "Option::is_none")]
            out: Option<&'a Shape>,
        }

        let input = match self.input_shapes.as_slice() {
            [shape] => InShapes::One(shape),
            shapes => InShapes::Many(shapes),
        };

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("_id", &self.id)?;
        map.serialize_entry("_class", &self.kind)?;
        map.serialize_entry(
            "_shape",
            &BlockShape {
                input,
                out: self.shape.as_ref(),
            },
        )?;
        if let Some(nested) = &self.nested {
            map.serialize_entry("architecture", nested)?;
        }
        map.end()
    }
}

/// Resolved shapes of an architecture, or of the blocks nested in a group.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Resolution {
    #[serde(rename = "_id", skip_serializing_if = "String::is_empty")]
    id: String,
    inputs: Vec<ResolvedPort>,
    outputs: Vec<ResolvedPort>,
    blocks: Vec<ResolvedBlock>,
    #[serde(skip)]
    order: Vec<String>,
    #[serde(skip)]
    errors: Vec<ResolveError>,
}

impl Resolution {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn inputs(&self) -> &[ResolvedPort] {
        &self.inputs
    }

    /// Resolved outputs. If the scope declares no outputs, this has one
    /// entry with an empty id for the last block.
    pub fn outputs(&self) -> &[ResolvedPort] {
        &self.outputs
    }

    /// Resolved blocks, in declaration order.
    pub fn blocks(&self) -> &[ResolvedBlock] {
        &self.blocks
    }

    /// Ids of blocks in the order they were evaluated.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Errors for this scope and every nested scope.
    pub fn errors(&self) -> &[ResolveError] {
        &self.errors
    }

    /// Return true if resolution succeeded without errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Return the shape of the first output.
    pub fn output_shape(&self) -> Option<&Shape> {
        self.outputs.first().and_then(|port| port.shape.as_ref())
    }

    /// Find a block by its namespaced id, eg. `g1.b1` for block `b1` inside
    /// group `g1`.
    pub fn block(&self, path: &str) -> Option<&ResolvedBlock> {
        match path.split_once(PATH_SEPARATOR) {
            Some((head, rest)) => {
                let block = self.blocks.iter().find(|b| b.id == head)?;
                block.nested.as_ref()?.block(rest)
            }
            None => self.blocks.iter().find(|b| b.id == path),
        }
    }

    /// Return the shape of a block or port by its namespaced id.
    pub fn shape(&self, path: &str) -> Option<&Shape> {
        if let Some(block) = self.block(path) {
            return block.shape.as_ref();
        }
        let (scope, id) = match path.rsplit_once(PATH_SEPARATOR) {
            Some((head, id)) => (self.block(head)?.nested.as_deref()?, id),
            None => (self, path),
        };
        scope
            .inputs
            .iter()
            .chain(&scope.outputs)
            .find(|port| !port.id.is_empty() && port.id == id)
            .and_then(|port| port.shape.as_ref())
    }

    /// Return `Ok(self)` if resolution succeeded, or the errors otherwise.
    pub fn into_result(self) -> Result<Resolution, ResolveErrors> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(ResolveErrors(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Resolution, Resolver, ScopeEnv};
    use crate::architecture::Architecture;
    use crate::error::ErrorKind;
    use crate::options::ResolveOptions;
    use crate::registry::Registry;
    use crate::shape::shape;
    use crate::sym_expr::SymbolMap;

    fn resolve(value: serde_json::Value) -> Resolution {
        let arch: Architecture = serde_json::from_value(value).unwrap();
        let registry = Registry::with_builtins();
        Resolver::with_options(&registry, ResolveOptions::new()).resolve(&arch)
    }

    fn error_kinds(res: &Resolution) -> Vec<(String, ErrorKind)> {
        res.errors()
            .iter()
            .map(|e| (e.block_path(), e.kind()))
            .collect()
    }

    #[test]
    fn test_scope_env() {
        let mut symbols = SymbolMap::default();
        symbols.insert("N".into(), 4);
        let env = ScopeEnv::new(symbols);

        let mut overrides = SymbolMap::default();
        overrides.insert("N".into(), 8);
        overrides.insert("M".into(), 2);
        let nested = env.nested(&overrides);

        assert_eq!(nested.depth, 1);
        assert_eq!(nested.symbols.get("N"), Some(&8));
        assert!(nested.declared.contains("M"));
        assert_eq!(env.symbols.get("N"), Some(&4));

        // Pinned values win over overrides at every level.
        let mut env = env;
        let mut pinned = SymbolMap::default();
        pinned.insert("M".into(), 5);
        env.pin(&pinned);
        let nested = env.nested(&overrides);
        assert_eq!(nested.symbols.get("M"), Some(&5));
        assert_eq!(nested.symbols.get("N"), Some(&8));
        let inner = nested.nested(&overrides);
        assert_eq!(inner.symbols.get("M"), Some(&5));
        assert_eq!(inner.depth, 2);
    }

    #[test]
    fn test_independent_failures() {
        let res = resolve(json!({
            "inputs": [{"_id": "x", "_shape": [3, 16]}],
            "blocks": [
                {"_id": "bad", "_class": "Linear", "_inputs": ["x"]},
                {"_id": "after_bad", "_class": "ReLU", "_inputs": ["bad"]},
                {"_id": "good", "_class": "Linear", "output_feats": 4, "_inputs": ["x"]},
            ],
            "outputs": [{"_id": "y", "_source": "good"}],
        }));

        // Only the failing block reports an error. Its dependent is skipped.
        assert_eq!(error_kinds(&res), [("bad".to_string(), ErrorKind::Validation)]);
        assert_eq!(res.shape("good"), Some(&shape![3, 4]));
        assert_eq!(res.shape("after_bad"), None);
        assert!(res.block("after_bad").is_some());
        assert_eq!(res.shape("y"), Some(&shape![3, 4]));
    }

    #[test]
    fn test_declared_output_shape() {
        let arch = |out_shape: serde_json::Value| {
            json!({
                "inputs": [{"_id": "x", "_shape": [2, 8]}],
                "outputs": [{"_id": "y", "_shape": out_shape}],
                "blocks": [{"_id": "fc", "_class": "Linear", "output_feats": 4}],
            })
        };

        let res = resolve(arch(json!(["<<auto>>", 4])));
        assert!(res.is_ok());
        assert_eq!(res.shape("y"), Some(&shape![2, 4]));

        let res = resolve(arch(json!([2, 5])));
        assert_eq!(error_kinds(&res), [("y".to_string(), ErrorKind::ShapeMismatch)]);
    }

    #[test]
    fn test_input_without_shape() {
        let res = resolve(json!({
            "inputs": [{"_id": "x"}],
            "blocks": [{"_id": "a", "_class": "ReLU"}],
        }));
        assert_eq!(error_kinds(&res), [("x".to_string(), ErrorKind::Validation)]);
        assert_eq!(res.shape("a"), None);
    }

    #[test]
    fn test_strict_variables() {
        let arch: Architecture = serde_json::from_value(json!({
            "_ext_vars": {"B": null},
            "inputs": [{"_id": "x", "_shape": ["<<variable:B>>", "<<variable:L>>"]}],
            "blocks": [{"_id": "a", "_class": "ReLU"}],
        }))
        .unwrap();
        let registry = Registry::with_builtins();

        let lenient = Resolver::with_options(&registry, ResolveOptions::new());
        assert!(lenient.resolve(&arch).is_ok());

        let strict = Resolver::with_options(
            &registry,
            ResolveOptions {
                strict_variables: true,
                ..ResolveOptions::new()
            },
        );
        let res = strict.resolve(&arch);
        assert_eq!(error_kinds(&res), [("x".to_string(), ErrorKind::Validation)]);
    }

    #[test]
    fn test_max_depth() {
        let arch: Architecture = serde_json::from_value(json!({
            "inputs": [{"_id": "x", "_shape": [4]}],
            "blocks": [{
                "_id": "outer",
                "_class": "Sequential",
                "blocks": [{
                    "_id": "inner",
                    "_class": "Sequential",
                    "blocks": [{"_id": "act", "_class": "ReLU"}],
                }],
            }],
        }))
        .unwrap();
        let registry = Registry::with_builtins();

        let res = Resolver::with_options(&registry, ResolveOptions::new()).resolve(&arch);
        assert_eq!(res.shape("outer.inner.act"), Some(&shape![4]));

        let shallow = ResolveOptions {
            max_depth: 1,
            ..ResolveOptions::new()
        };
        let res = Resolver::with_options(&registry, shallow).resolve(&arch);
        assert_eq!(
            error_kinds(&res),
            [("outer.inner".to_string(), ErrorKind::Validation)]
        );
        assert_eq!(res.shape("outer"), None);
    }

    #[test]
    fn test_serialize() {
        let res = resolve(json!({
            "_id": "net",
            "inputs": [{"_id": "a", "_shape": [4]}, {"_id": "b", "_shape": [4]}],
            "outputs": [{"_id": "y"}],
            "blocks": [
                {"_id": "sum", "_class": "Add"},
                {"_id": "act", "_class": "ReLU"},
            ],
        }));
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(
            json,
            json!({
                "_id": "net",
                "inputs": [{"_id": "a", "_shape": [4]}, {"_id": "b", "_shape": [4]}],
                "outputs": [{"_id": "y", "_shape": [4]}],
                "blocks": [
                    {"_id": "sum", "_class": "Add", "_shape": {"in": [[4], [4]], "out": [4]}},
                    {"_id": "act", "_class": "ReLU", "_shape": {"in": [4], "out": [4]}},
                ],
            })
        );
    }

    #[test]
    fn test_resolve_all() {
        let archs: Vec<Architecture> = [4, 8]
            .iter()
            .map(|size| {
                serde_json::from_value(json!({
                    "inputs": [{"_id": "x", "_shape": [size]}],
                    "blocks": [{"_id": "fc", "_class": "Linear", "output_feats": 2}],
                }))
                .unwrap()
            })
            .collect();
        let registry = Registry::with_builtins();
        let results = Resolver::with_options(&registry, ResolveOptions::new()).resolve_all(&archs);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|res| res.shape("fc") == Some(&shape![2])));
    }
}
