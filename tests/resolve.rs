use std::fs::read_to_string;
use std::path::PathBuf;

use narchi::{
    Architecture, Arity, Block, Dim, ErrorKind, Propagate, PropagateContext, PropagateError,
    Registry, ResolveOptions, Resolver, Shape, SymbolMap,
};
use serde_json::json;

fn load_architecture(name: &str) -> Architecture {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("test-data/architectures/");
    path.push(name);
    let json = read_to_string(&path).unwrap();
    Architecture::from_json(&json).unwrap()
}

fn arch(value: serde_json::Value) -> Architecture {
    serde_json::from_value(value).unwrap()
}

fn shape(value: serde_json::Value) -> Shape {
    serde_json::from_value(value).unwrap()
}

fn resolver(registry: &Registry) -> Resolver<'_> {
    Resolver::with_options(registry, ResolveOptions::new())
}

fn vars(pairs: &[(&str, i64)]) -> SymbolMap {
    pairs
        .iter()
        .map(|(name, val)| (name.to_string(), *val))
        .collect()
}

#[test]
fn test_conv_net() {
    let registry = Registry::with_builtins();
    let arch = load_architecture("conv_net.json");

    let res = resolver(&registry).resolve(&arch);
    assert!(res.is_ok(), "{:?}", res.errors());
    let half_width = Dim::parse("<<variable:W/2>>").unwrap();
    assert_eq!(res.shape("conv1"), Some(&shape(json!([16, 64, "<<variable:W>>"]))));
    assert_eq!(res.shape("pool1").and_then(|s| s.get_dim(-1)), Some(&half_width));
    assert_eq!(res.shape("gap"), Some(&shape(json!([32, 1, 1]))));
    assert_eq!(res.shape("flat"), Some(&shape(json!([32]))));
    assert_eq!(res.shape("logits"), Some(&shape(json!([10]))));

    // Binding the width gives concrete sizes.
    let res = resolver(&registry).resolve_with_vars(&arch, &vars(&[("W", 128)]));
    assert!(res.is_ok());
    assert_eq!(res.shape("image"), Some(&shape(json!([3, 64, 128]))));
    assert_eq!(res.shape("pool1"), Some(&shape(json!([16, 32, 64]))));
}

#[test]
fn test_residual_group() {
    let registry = Registry::with_builtins();
    let res = resolver(&registry).resolve(&load_architecture("residual.json"));
    assert!(res.is_ok(), "{:?}", res.errors());

    let expected = shape(json!([64, 32, 32]));
    assert_eq!(res.shape("branch"), Some(&expected));
    assert_eq!(res.shape("branch.conv_b"), Some(&expected));
    assert_eq!(res.shape("branch.in"), Some(&expected));
    assert_eq!(res.shape("y"), Some(&expected));
    assert_eq!(res.order(), ["branch", "sum", "act"]);

    let sum = res.block("sum").unwrap();
    assert_eq!(sum.input_shapes, [expected.clone(), expected]);
}

#[test]
fn test_sequential() {
    let registry = Registry::with_builtins();
    let res = resolver(&registry).resolve(&load_architecture("tagger.json"));
    assert!(res.is_ok(), "{:?}", res.errors());

    assert_eq!(res.shape("embed"), Some(&shape(json!(["<<variable:L>>", 128]))));
    assert_eq!(res.shape("encoder.0"), Some(&shape(json!(["<<variable:L>>", 128]))));
    assert_eq!(res.shape("tags"), Some(&shape(json!(["<<variable:L>>", 9]))));
}

#[test]
fn test_cycle() {
    let registry = Registry::with_builtins();
    let res = resolver(&registry).resolve(&arch(json!({
        "inputs": [{"_id": "x", "_shape": [4]}],
        "blocks": [
            {"_id": "A", "_class": "Add"},
            {"_id": "B", "_class": "ReLU"},
        ],
        "graph": ["x -> A -> B -> A"],
    })));

    assert_eq!(res.errors().len(), 1);
    assert_eq!(res.errors()[0].kind(), ErrorKind::Cycle);
    assert!(res.blocks().is_empty());
    assert!(res.order().is_empty());
}

#[test]
fn test_self_loop() {
    let registry = Registry::with_builtins();
    let from_inputs = arch(json!({
        "inputs": [{"_id": "x", "_shape": [4]}],
        "blocks": [{"_id": "A", "_class": "Add", "_inputs": ["x", "A"]}],
    }));
    let from_graph = arch(json!({
        "inputs": [{"_id": "x", "_shape": [4]}],
        "blocks": [{"_id": "A", "_class": "Add"}],
        "graph": ["x -> A", "A -> A"],
    }));

    for arch in [from_inputs, from_graph] {
        let res = resolver(&registry).resolve(&arch);
        assert_eq!(res.errors().len(), 1);
        assert_eq!(res.errors()[0].kind(), ErrorKind::Cycle);
        assert_eq!(res.errors()[0].block_path(), "A");
    }
}

#[test]
fn test_evaluation_order() {
    let registry = Registry::with_builtins();
    let res = resolver(&registry).resolve(&arch(json!({
        "inputs": [{"_id": "x", "_shape": [2, 8]}],
        "blocks": [
            {"_id": "C", "_class": "Linear", "output_feats": 3},
            {"_id": "A", "_class": "Linear", "output_feats": 5},
            {"_id": "B", "_class": "ReLU"},
        ],
        "graph": ["x -> A -> B -> C"],
    })));

    assert!(res.is_ok());
    assert_eq!(res.order(), ["A", "B", "C"]);
    let ids: Vec<&str> = res.blocks().iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, ["C", "A", "B"]);
    assert_eq!(res.output_shape(), Some(&shape(json!([2, 3]))));
}

#[test]
fn test_group_error_path() {
    let registry = Registry::with_builtins();
    let res = resolver(&registry).resolve(&arch(json!({
        "inputs": [{"_id": "x", "_shape": [8]}],
        "blocks": [
            {
                "_id": "g1",
                "_class": "Group",
                "architecture": {
                    "inputs": [{"_id": "in", "_shape": [8]}],
                    "blocks": [{"_id": "b1", "_class": "Linear"}],
                },
            },
            {"_id": "after", "_class": "ReLU"},
        ],
    })));

    let errors = res.clone().into_result().unwrap_err();
    assert_eq!(errors.len(), 1);
    let err = errors.find("g1.b1").unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.path(), ["g1", "b1"]);
    assert!(errors.find("g1").is_none());
    assert_eq!(res.shape("g1"), None);
    assert_eq!(res.shape("after"), None);
}

#[test]
fn test_caller_vars_override_nested_defaults() {
    let registry = Registry::with_builtins();
    let group = |block_vars: serde_json::Value| {
        arch(json!({
            "inputs": [{"_id": "x", "_shape": [8]}],
            "blocks": [{
                "_id": "g",
                "_class": "Group",
                "_ext_vars": block_vars,
                "architecture": {
                    "_ext_vars": {"H": 3},
                    "inputs": [{"_id": "in", "_shape": [8]}],
                    "blocks": [{
                        "_id": "fc",
                        "_class": "Linear",
                        "output_feats": "<<variable:H>>",
                    }],
                },
            }],
        }))
    };
    let unset = group(json!({}));
    let set_by_block = group(json!({"H": 4}));

    // Defaults of the body, replaced by the group block's `_ext_vars`.
    let res = resolver(&registry).resolve(&unset);
    assert_eq!(res.shape("g"), Some(&shape(json!([3]))));
    let res = resolver(&registry).resolve(&set_by_block);
    assert_eq!(res.shape("g"), Some(&shape(json!([4]))));

    // Values from the caller replace both.
    for arch in [unset, set_by_block] {
        let res = resolver(&registry).resolve_with_vars(&arch, &vars(&[("H", 5)]));
        assert!(res.is_ok(), "{:?}", res.errors());
        assert_eq!(res.shape("g"), Some(&shape(json!([5]))));
        assert_eq!(res.shape("g.fc"), Some(&shape(json!([5]))));
    }
}

#[test]
fn test_symbolic_group_input() {
    let registry = Registry::with_builtins();
    let group = |declared: serde_json::Value| {
        arch(json!({
            "_ext_vars": {"L": null},
            "inputs": [{"_id": "x", "_shape": ["<<variable:L>>", 8]}],
            "blocks": [{
                "_id": "g",
                "_class": "Group",
                "architecture": {
                    "_ext_vars": {"H": null},
                    "inputs": [{"_id": "in", "_shape": declared}],
                    "blocks": [{"_id": "act", "_class": "ReLU"}],
                },
            }],
        }))
    };

    // Body variables bind only to concrete sizes.
    let res = resolver(&registry).resolve(&group(json!(["<<variable:H>>", 8])));
    assert_eq!(res.errors().len(), 1);
    assert_eq!(res.errors()[0].kind(), ErrorKind::ShapeMismatch);
    assert_eq!(res.errors()[0].block_path(), "g.in");

    let res = resolver(&registry).resolve(&group(json!(["<<variable:L>>", 8])));
    assert!(res.is_ok(), "{:?}", res.errors());
    assert_eq!(res.shape("g"), Some(&shape(json!(["<<variable:L>>", 8]))));

    let res = resolver(&registry)
        .resolve_with_vars(&group(json!(["<<variable:H>>", 8])), &vars(&[("L", 6)]));
    assert!(res.is_ok(), "{:?}", res.errors());
    assert_eq!(res.shape("g.act"), Some(&shape(json!([6, 8]))));
}

#[test]
fn test_size_overflow() {
    let registry = Registry::with_builtins();
    let res = resolver(&registry).resolve(&arch(json!({
        "inputs": [{"_id": "x", "_shape": [4294967296_i64, 4294967296_i64, 4]}],
        "blocks": [
            {"_id": "flat", "_class": "Reshape", "reshape_spec": "flatten", "_inputs": ["x"]},
            {"_id": "after_flat", "_class": "ReLU", "_inputs": ["flat"]},
            {"_id": "merge", "_class": "Reshape", "reshape_spec": [[0, 1], 2], "_inputs": ["x"]},
            {"_id": "act", "_class": "ReLU", "_inputs": ["x"]},
        ],
        "outputs": [{"_id": "y", "_source": "act"}],
    })));

    // Only the blocks whose sizes overflow fail.
    let errors: Vec<_> = res
        .errors()
        .iter()
        .map(|err| (err.block_path(), err.kind()))
        .collect();
    assert_eq!(
        errors,
        [
            ("flat".to_string(), ErrorKind::Dimension),
            ("merge".to_string(), ErrorKind::Dimension),
        ]
    );
    assert_eq!(res.shape("after_flat"), None);
    assert_eq!(
        res.shape("act"),
        Some(&shape(json!([4294967296_i64, 4294967296_i64, 4])))
    );
    assert_eq!(
        res.shape("y"),
        Some(&shape(json!([4294967296_i64, 4294967296_i64, 4])))
    );
}

#[test]
fn test_window_overflow() {
    let registry = Registry::with_builtins();
    let huge = 1_i64 << 62;
    let res = resolver(&registry).resolve(&arch(json!({
        "inputs": [{"_id": "x", "_shape": [3, 8, 8]}],
        "blocks": [
            {"_id": "padded", "_class": "Conv2d", "output_feats": 4, "kernel_size": 3, "padding": huge, "_inputs": ["x"]},
            {"_id": "dilated", "_class": "Conv2d", "output_feats": 4, "kernel_size": 3, "dilation": huge, "_inputs": ["x"]},
            {"_id": "conv", "_class": "Conv2d", "output_feats": 4, "kernel_size": 3, "_inputs": ["x"]},
        ],
        "outputs": [{"_id": "y", "_source": "conv"}],
    })));

    let failed: Vec<_> = res
        .errors()
        .iter()
        .map(|err| (err.block_path(), err.kind()))
        .collect();
    assert_eq!(
        failed,
        [
            ("padded".to_string(), ErrorKind::Dimension),
            ("dilated".to_string(), ErrorKind::Dimension),
        ]
    );
    assert_eq!(res.shape("conv"), Some(&shape(json!([4, 6, 6]))));
}

#[test]
fn test_bound_size_overflow() {
    let registry = Registry::with_builtins();
    let arch = arch(json!({
        "_ext_vars": {"N": null},
        "inputs": [{"_id": "x", "_shape": ["<<variable:N*N>>"]}],
        "blocks": [{"_id": "act", "_class": "ReLU"}],
    }));

    let res = resolver(&registry).resolve_with_vars(&arch, &vars(&[("N", 1 << 40)]));
    assert_eq!(res.errors().len(), 1);
    assert_eq!(res.errors()[0].kind(), ErrorKind::Dimension);
    assert_eq!(res.errors()[0].block_path(), "x");
    assert_eq!(res.shape("act"), None);
}

#[test]
fn test_variable_consistency() {
    let registry = Registry::with_builtins();
    let arch = arch(json!({
        "_ext_vars": {"N": null},
        "inputs": [
            {"_id": "a", "_shape": ["<<variable:N>>"]},
            {"_id": "b", "_shape": [10]},
        ],
        "blocks": [{"_id": "sum", "_class": "Add"}],
    }));

    let res = resolver(&registry).resolve_with_vars(&arch, &vars(&[("N", 10)]));
    assert!(res.is_ok());
    assert_eq!(res.shape("sum"), Some(&shape(json!([10]))));

    let res = resolver(&registry).resolve_with_vars(&arch, &vars(&[("N", 12)]));
    assert_eq!(res.errors().len(), 1);
    assert_eq!(res.errors()[0].kind(), ErrorKind::ShapeMismatch);
    assert_eq!(res.errors()[0].block_path(), "sum");
}

#[test]
fn test_reshape_round_trip() {
    let registry = Registry::with_builtins();
    let res = resolver(&registry).resolve(&arch(json!({
        "inputs": [{"_id": "x", "_shape": [2, 3, 4]}],
        "blocks": [
            {"_id": "flat", "_class": "Reshape", "reshape_spec": "flatten"},
            {"_id": "split", "_class": "Reshape", "reshape_spec": [{"0": [2, 3, "<<auto>>"]}]},
            {"_id": "halves", "_class": "Reshape", "reshape_spec": [0, 1, {"2": ["<<auto>>", 2]}]},
        ],
    })));
    assert!(res.is_ok());
    assert_eq!(res.shape("flat"), Some(&shape(json!([24]))));
    assert_eq!(res.shape("split"), Some(&shape(json!([2, 3, 4]))));
    assert_eq!(res.shape("halves"), Some(&shape(json!([2, 3, 2, 2]))));
}

#[test]
fn test_unknown_type() {
    let registry = Registry::with_builtins();
    let res = resolver(&registry).resolve(&arch(json!({
        "inputs": [{"_id": "x", "_shape": [4]}],
        "blocks": [
            {"_id": "a", "_class": "ReLU"},
            {"_id": "b", "_class": "Frobnicate"},
        ],
    })));

    assert_eq!(res.errors().len(), 1);
    assert_eq!(res.errors()[0].kind(), ErrorKind::UnknownType);
    assert!(res.errors()[0].kind().is_structural());
    // Structural errors stop resolution before any block is propagated.
    assert_eq!(res.shape("a"), None);
}

#[test]
fn test_idempotent() {
    let registry = Registry::with_builtins();
    let arch = load_architecture("residual.json");
    let resolver = resolver(&registry);
    assert_eq!(resolver.resolve(&arch), resolver.resolve(&arch));
}

#[test]
fn test_custom_block_type() {
    /// Halves the last dimension.
    struct Halve;

    impl Propagate for Halve {
        fn propagate(
            &self,
            _block: &Block,
            inputs: &[Shape],
            _ctx: &mut PropagateContext,
        ) -> Result<Shape, PropagateError> {
            let input = &inputs[0];
            let last = input
                .get_dim(-1)
                .ok_or_else(|| PropagateError::rank("at least 1", 0))?;
            let half = Dim::divide(last, &Dim::value(2))?;
            Ok(input.set_dim(-1, half).unwrap_or_else(|| input.clone()))
        }
    }

    let mut registry = Registry::with_builtins();
    registry.register("Halve", Halve).unwrap();
    let res = resolver(&registry).resolve(&arch(json!({
        "inputs": [{"_id": "x", "_shape": [3, "<<variable:2*K>>"]}],
        "blocks": [{"_id": "h", "_class": "Halve"}],
    })));
    assert!(res.is_ok(), "{:?}", res.errors());
    assert_eq!(res.shape("h"), Some(&shape(json!([3, "<<variable:K>>"]))));
}

#[test]
fn test_input_count_range() {
    /// Passes through the first of one or two inputs.
    struct First;

    impl Propagate for First {
        fn arity(&self) -> Arity {
            Arity::Range(1, 2)
        }

        fn propagate(
            &self,
            _block: &Block,
            inputs: &[Shape],
            _ctx: &mut PropagateContext,
        ) -> Result<Shape, PropagateError> {
            Ok(inputs[0].clone())
        }
    }

    let mut registry = Registry::with_builtins();
    registry.register("First", First).unwrap();
    let res = resolver(&registry).resolve(&arch(json!({
        "inputs": [
            {"_id": "a", "_shape": [4]},
            {"_id": "b", "_shape": [5]},
            {"_id": "c", "_shape": [6]},
        ],
        "blocks": [
            {"_id": "one", "_class": "First", "_inputs": ["a"]},
            {"_id": "two", "_class": "First", "_inputs": ["b", "a"]},
            {"_id": "three", "_class": "First", "_inputs": ["a", "b", "c"]},
        ],
        "outputs": [{"_id": "y", "_source": "two"}],
    })));

    assert_eq!(res.shape("one"), Some(&shape(json!([4]))));
    assert_eq!(res.shape("two"), Some(&shape(json!([5]))));
    assert_eq!(res.shape("three"), None);
    assert_eq!(res.errors().len(), 1);
    let err = &res.errors()[0];
    assert_eq!(err.kind(), ErrorKind::Arity);
    assert_eq!(err.block_path(), "three");
    assert!(err.to_string().contains("expected between 1 and 2 input(s), got 3"));
}

#[test]
fn test_serialize_resolution() {
    let registry = Registry::with_builtins();
    let res = resolver(&registry).resolve(&load_architecture("tagger.json"));
    let value = serde_json::to_value(&res).unwrap();

    assert_eq!(value["_id"], "tagger");
    assert_eq!(value["outputs"][0]["_shape"], json!(["<<variable:L>>", 9]));
    let encoder = &value["blocks"][1];
    assert_eq!(encoder["_class"], "Sequential");
    assert_eq!(encoder["_shape"]["in"], json!(["<<variable:L>>", 128]));
    assert_eq!(
        encoder["architecture"]["blocks"][0]["_shape"]["out"],
        json!(["<<variable:L>>", 128])
    );
}
