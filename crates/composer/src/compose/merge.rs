//! Model and graph merging
//!
//! Splices the preprocessing graph (first) into the base graph (second):
//! every connected base input is replaced by the preprocessing output feeding
//! it, and both endpoints disappear from the merged graph's external surface.

use super::io_map::Connection;
use crate::proto::{
    FunctionProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, StringStringEntryProto,
    ValueInfoProto,
};
use crate::{ComposerError, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

/// Producer name stamped on merged models
pub const PRODUCER_NAME: &str = "sentinel-onnx";

/// Options for [`merge_models`]
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Prefix applied to every name in the preprocessing graph
    pub prefix_preprocessing: Option<String>,
    /// Prefix applied to every name in the base graph
    pub prefix_base: Option<String>,
    /// Name of the merged graph (defaults to `"{pre}_{base}"`)
    pub graph_name: Option<String>,
}

/// Merge two models, connecting preprocessing outputs to base inputs
///
/// Both models must already declare the same IR version.
pub fn merge_models(
    preprocessing: &ModelProto,
    base: &ModelProto,
    connections: &[Connection],
    options: &MergeOptions,
) -> Result<ModelProto> {
    if preprocessing.ir_version != base.ir_version {
        return Err(ComposerError::VersionMismatch {
            preprocessing: preprocessing.ir_version,
            base: base.ir_version,
        });
    }

    if !preprocessing.training_info.is_empty() || !base.training_info.is_empty() {
        return Err(ComposerError::InvalidModel(
            "models carrying training_info cannot be merged".to_string(),
        ));
    }

    let opset_import = merge_opsets(&preprocessing.opset_import, &base.opset_import)?;

    let mut g1 = preprocessing
        .graph
        .clone()
        .ok_or_else(|| ComposerError::InvalidModel("preprocessing model has no graph".into()))?;
    let mut g2 = base
        .graph
        .clone()
        .ok_or_else(|| ComposerError::InvalidModel("base model has no graph".into()))?;

    let mut connections = connections.to_vec();
    if let Some(prefix) = options.prefix_preprocessing.as_deref() {
        add_prefix(&mut g1, prefix);
        for conn in &mut connections {
            conn.from = prefixed(prefix, &conn.from);
        }
    }
    if let Some(prefix) = options.prefix_base.as_deref() {
        add_prefix(&mut g2, prefix);
        for conn in &mut connections {
            conn.to = prefixed(prefix, &conn.to);
        }
    }

    let graph = merge_graphs(&g1, &g2, &connections, options.graph_name.as_deref())?;

    Ok(ModelProto {
        ir_version: base.ir_version,
        opset_import,
        producer_name: PRODUCER_NAME.to_string(),
        producer_version: env!("CARGO_PKG_VERSION").to_string(),
        domain: base.domain.clone(),
        model_version: base.model_version,
        doc_string: base.doc_string.clone(),
        graph: Some(graph),
        metadata_props: merge_metadata(&preprocessing.metadata_props, &base.metadata_props)?,
        training_info: Vec::new(),
        functions: merge_functions(&preprocessing.functions, &base.functions)?,
    })
}

/// Merge two graphs: `g1`'s outputs feed `g2`'s inputs per `connections`
pub fn merge_graphs(
    g1: &GraphProto,
    g2: &GraphProto,
    connections: &[Connection],
    name: Option<&str>,
) -> Result<GraphProto> {
    check_endpoints(g1, g2, connections)?;
    check_types(g1, g2, connections)?;
    check_overlapping_names(g1, g2, connections)?;

    let consumed: FxHashSet<&str> = connections.iter().map(|c| c.from.as_str()).collect();
    let replaced: FxHashSet<&str> = connections.iter().map(|c| c.to.as_str()).collect();
    let rename: FxHashMap<String, String> = connections
        .iter()
        .map(|c| (c.to.clone(), c.from.clone()))
        .collect();

    let mut g2 = g2.clone();
    rename_references(&mut g2, &rename);

    let mut merged = GraphProto {
        name: name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}", g1.name, g2.name)),
        doc_string: format!("Graph combining {} and {}", g1.name, g2.name),
        ..Default::default()
    };

    merged.node.extend(g1.node.iter().cloned());
    merged.node.extend(g2.node.iter().cloned());

    let mut seen_inputs = FxHashSet::default();
    for input in g1
        .input
        .iter()
        .chain(g2.input.iter().filter(|i| !replaced.contains(i.name.as_str())))
    {
        if seen_inputs.insert(input.name.clone()) {
            merged.input.push(input.clone());
        }
    }

    let mut seen_outputs = FxHashSet::default();
    for output in g1
        .output
        .iter()
        .filter(|o| !consumed.contains(o.name.as_str()))
        .chain(g2.output.iter())
    {
        if seen_outputs.insert(output.name.clone()) {
            merged.output.push(output.clone());
        }
    }

    merged.initializer.extend(g1.initializer.iter().cloned());
    merged.initializer.extend(
        g2.initializer
            .iter()
            .filter(|t| !replaced.contains(t.name.as_str()))
            .cloned(),
    );

    merged
        .sparse_initializer
        .extend(g1.sparse_initializer.iter().cloned());
    merged.sparse_initializer.extend(
        g2.sparse_initializer
            .iter()
            .filter(|s| {
                let name = s.values.as_ref().map(|v| v.name.as_str()).unwrap_or("");
                !replaced.contains(name)
            })
            .cloned(),
    );

    merged.value_info.extend(g1.value_info.iter().cloned());
    merged.value_info.extend(
        g2.value_info
            .iter()
            .filter(|v| !replaced.contains(v.name.as_str()))
            .cloned(),
    );

    merged
        .quantization_annotation
        .extend(g1.quantization_annotation.iter().cloned());
    merged.quantization_annotation.extend(
        g2.quantization_annotation
            .iter()
            .filter(|a| !replaced.contains(a.tensor_name.as_str()))
            .cloned(),
    );

    merged.metadata_props = merge_metadata(&g1.metadata_props, &g2.metadata_props)?;

    Ok(merged)
}

/// Prefix every tensor, node and graph name in `graph`, including subgraphs
pub fn add_prefix(graph: &mut GraphProto, prefix: &str) {
    if prefix.is_empty() {
        return;
    }

    graph.name = prefixed(prefix, &graph.name);

    for vi in graph
        .input
        .iter_mut()
        .chain(graph.output.iter_mut())
        .chain(graph.value_info.iter_mut())
    {
        vi.name = prefixed(prefix, &vi.name);
    }

    for init in &mut graph.initializer {
        init.name = prefixed(prefix, &init.name);
    }

    for sparse in &mut graph.sparse_initializer {
        if let Some(values) = sparse.values.as_mut() {
            values.name = prefixed(prefix, &values.name);
        }
        if let Some(indices) = sparse.indices.as_mut() {
            indices.name = prefixed(prefix, &indices.name);
        }
    }

    for annotation in &mut graph.quantization_annotation {
        annotation.tensor_name = prefixed(prefix, &annotation.tensor_name);
        for entry in &mut annotation.quant_parameter_tensor_names {
            entry.value = prefixed(prefix, &entry.value);
        }
    }

    for node in &mut graph.node {
        node.name = prefixed(prefix, &node.name);
        for name in node.input.iter_mut().chain(node.output.iter_mut()) {
            *name = prefixed(prefix, name);
        }
        for_each_subgraph(node, |sub| add_prefix(sub, prefix));
    }
}

fn prefixed(prefix: &str, name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!("{}{}", prefix, name)
    }
}

fn for_each_subgraph(node: &mut NodeProto, mut f: impl FnMut(&mut GraphProto)) {
    for attr in &mut node.attribute {
        if let Some(g) = attr.g.as_mut() {
            f(g);
        }
        for g in &mut attr.graphs {
            f(g);
        }
    }
}

/// Rename references (node inputs, passthrough outputs) per `rename`
fn rename_references(graph: &mut GraphProto, rename: &FxHashMap<String, String>) {
    for node in &mut graph.node {
        for input in &mut node.input {
            if let Some(new) = rename.get(input.as_str()) {
                *input = new.clone();
            }
        }
        for_each_subgraph(node, |sub| rename_references(sub, rename));
    }

    for output in &mut graph.output {
        if let Some(new) = rename.get(output.name.as_str()) {
            output.name = new.clone();
        }
    }
}

fn check_endpoints(g1: &GraphProto, g2: &GraphProto, connections: &[Connection]) -> Result<()> {
    for conn in connections {
        if !g1.output.iter().any(|o| o.name == conn.from) {
            return Err(ComposerError::UnknownConnectionEndpoint(format!(
                "'{}' is not an output of graph '{}'",
                conn.from, g1.name
            )));
        }
        if !g2.input.iter().any(|i| i.name == conn.to) {
            return Err(ComposerError::UnknownConnectionEndpoint(format!(
                "'{}' is not an input of graph '{}'",
                conn.to, g2.name
            )));
        }
    }
    Ok(())
}

fn find<'a>(values: &'a [ValueInfoProto], name: &str) -> Option<&'a ValueInfoProto> {
    values.iter().find(|v| v.name == name)
}

fn check_types(g1: &GraphProto, g2: &GraphProto, connections: &[Connection]) -> Result<()> {
    for conn in connections {
        let (Some(from), Some(to)) = (find(&g1.output, &conn.from), find(&g2.input, &conn.to))
        else {
            continue;
        };
        if let (Some(a), Some(b)) = (from.tensor_elem_type(), to.tensor_elem_type()) {
            if a != b {
                return Err(ComposerError::TypeMismatch {
                    from: conn.from.clone(),
                    to: conn.to.clone(),
                    from_type: from.type_string(),
                    to_type: to.type_string(),
                });
            }
        }
    }
    Ok(())
}

/// Every name a graph defines or references, minus `exclude`
fn graph_names(graph: &GraphProto, exclude: &FxHashSet<&str>) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut add = |name: &str| {
        if !name.is_empty() && !exclude.contains(name) {
            names.insert(name.to_string());
        }
    };

    for node in &graph.node {
        add(&node.name);
        node.input.iter().for_each(|n| add(n));
        node.output.iter().for_each(|n| add(n));
    }
    graph
        .input
        .iter()
        .chain(graph.output.iter())
        .chain(graph.value_info.iter())
        .for_each(|v| add(&v.name));
    graph.initializer.iter().for_each(|t| add(&t.name));
    graph
        .sparse_initializer
        .iter()
        .filter_map(|s| s.values.as_ref())
        .for_each(|t| add(&t.name));

    names
}

fn check_overlapping_names(
    g1: &GraphProto,
    g2: &GraphProto,
    connections: &[Connection],
) -> Result<()> {
    // External inputs declared by both graphs are shared, not overlapping
    let initializers: FxHashSet<&str> = g1
        .initializer
        .iter()
        .chain(g2.initializer.iter())
        .map(|t| t.name.as_str())
        .collect();
    let g2_inputs: FxHashSet<&str> = g2.input.iter().map(|i| i.name.as_str()).collect();
    let shared_inputs: FxHashSet<&str> = g1
        .input
        .iter()
        .map(|i| i.name.as_str())
        .filter(|n| g2_inputs.contains(n) && !initializers.contains(n))
        .collect();

    // Connected base inputs disappear from the merged graph; preprocessing
    // outputs keep their names, so they still count.
    let mut exclude2: FxHashSet<&str> = connections.iter().map(|c| c.to.as_str()).collect();
    exclude2.extend(shared_inputs.iter().copied());

    let names1 = graph_names(g1, &shared_inputs);
    let names2 = graph_names(g2, &exclude2);
    let overlap: Vec<String> = names1.intersection(&names2).cloned().collect();

    if overlap.is_empty() {
        Ok(())
    } else {
        Err(ComposerError::OverlappingNames(overlap))
    }
}

fn normalize_domain(domain: &str) -> &str {
    if domain == "ai.onnx" {
        ""
    } else {
        domain
    }
}

/// Union of opset imports; the same domain at two versions is a conflict
pub fn merge_opsets(
    a: &[OperatorSetIdProto],
    b: &[OperatorSetIdProto],
) -> Result<Vec<OperatorSetIdProto>> {
    let mut merged: Vec<OperatorSetIdProto> = Vec::new();

    for opset in a.iter().chain(b.iter()) {
        let domain = normalize_domain(&opset.domain);
        match merged
            .iter()
            .find(|m| normalize_domain(&m.domain) == domain)
        {
            Some(existing) if existing.version != opset.version => {
                return Err(ComposerError::OpsetConflict {
                    domain: if domain.is_empty() {
                        "ai.onnx".to_string()
                    } else {
                        domain.to_string()
                    },
                    left: existing.version,
                    right: opset.version,
                });
            }
            Some(_) => {}
            None => merged.push(opset.clone()),
        }
    }

    Ok(merged)
}

/// Union of metadata entries; a key with two different values is a conflict
pub fn merge_metadata(
    a: &[StringStringEntryProto],
    b: &[StringStringEntryProto],
) -> Result<Vec<StringStringEntryProto>> {
    let mut merged: Vec<StringStringEntryProto> = Vec::new();

    for entry in a.iter().chain(b.iter()) {
        match merged.iter().find(|m| m.key == entry.key) {
            Some(existing) if existing.value != entry.value => {
                return Err(ComposerError::MetadataConflict(entry.key.clone()));
            }
            Some(_) => {}
            None => merged.push(entry.clone()),
        }
    }

    Ok(merged)
}

fn merge_functions(a: &[FunctionProto], b: &[FunctionProto]) -> Result<Vec<FunctionProto>> {
    let mut merged: Vec<FunctionProto> = Vec::new();

    for func in a.iter().chain(b.iter()) {
        let same_id = |f: &&FunctionProto| {
            f.domain == func.domain && f.name == func.name && f.overload == func.overload
        };
        match merged.iter().find(same_id) {
            Some(existing) if existing != func => {
                return Err(ComposerError::OverlappingNames(vec![format!(
                    "function {}::{}",
                    func.domain, func.name
                )]));
            }
            Some(_) => {}
            None => merged.push(func.clone()),
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::tensor_proto::DataType;
    use crate::proto::{
        AttributeProto, Dim, SparseTensorProto, TensorAnnotation, TensorProto, TrainingInfoProto,
    };

    fn vi(name: &str, dt: DataType) -> ValueInfoProto {
        ValueInfoProto::tensor(name, dt, &[Dim::symbolic("batch_size")])
    }

    fn node(name: &str, op: &str, inputs: &[&str], outputs: &[&str]) -> NodeProto {
        NodeProto {
            name: name.to_string(),
            op_type: op.to_string(),
            input: inputs.iter().map(|s| s.to_string()).collect(),
            output: outputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn tokenizer_graph() -> GraphProto {
        GraphProto {
            name: "tok".to_string(),
            node: vec![node(
                "tokenize",
                "BertTokenizer",
                &["text"],
                &["input_ids", "extra_debug_tensor"],
            )],
            input: vec![vi("text", DataType::String)],
            output: vec![
                vi("input_ids", DataType::Int64),
                vi("extra_debug_tensor", DataType::Int64),
            ],
            ..Default::default()
        }
    }

    fn encoder_graph() -> GraphProto {
        GraphProto {
            name: "enc".to_string(),
            node: vec![
                node("embed", "Gather", &["word_embeddings", "input_ids"], &["h"]),
                node("scale", "Mul", &["h", "config_scale"], &["embeddings"]),
            ],
            input: vec![vi("input_ids", DataType::Int64), vi("config_scale", DataType::Float)],
            output: vec![vi("embeddings", DataType::Float)],
            initializer: vec![TensorProto {
                name: "word_embeddings".to_string(),
                data_type: DataType::Float as i32,
                dims: vec![4, 2],
                float_data: vec![0.0; 8],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn names(values: &[ValueInfoProto]) -> Vec<&str> {
        values.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_merge_graphs_external_surface() {
        let merged = merge_graphs(
            &tokenizer_graph(),
            &encoder_graph(),
            &[Connection::new("input_ids", "input_ids")],
            None,
        )
        .unwrap();

        assert_eq!(names(&merged.input), vec!["text", "config_scale"]);
        assert_eq!(names(&merged.output), vec!["extra_debug_tensor", "embeddings"]);
        assert_eq!(merged.name, "tok_enc");
        assert_eq!(merged.node.len(), 3);
        assert_eq!(merged.node[0].op_type, "BertTokenizer");
        assert_eq!(merged.initializer.len(), 1);
    }

    #[test]
    fn test_merge_renames_consumers() {
        let mut g1 = tokenizer_graph();
        g1.output[0].name = "ids".to_string();
        g1.node[0].output[0] = "ids".to_string();

        let merged = merge_graphs(
            &g1,
            &encoder_graph(),
            &[Connection::new("ids", "input_ids")],
            Some("pipeline"),
        )
        .unwrap();

        assert_eq!(merged.name, "pipeline");
        assert_eq!(merged.node[1].input, vec!["word_embeddings", "ids"]);
        assert!(!names(&merged.input).contains(&"input_ids"));
    }

    #[test]
    fn test_merge_renames_inside_subgraphs() {
        let mut g2 = encoder_graph();
        let body = GraphProto {
            name: "body".to_string(),
            node: vec![node("inner", "Identity", &["input_ids"], &["inner_out"])],
            output: vec![vi("inner_out", DataType::Int64)],
            ..Default::default()
        };
        g2.node.push(NodeProto {
            name: "branch".to_string(),
            op_type: "If".to_string(),
            input: vec!["cond".to_string()],
            output: vec!["branch_out".to_string()],
            attribute: vec![AttributeProto {
                name: "then_branch".to_string(),
                g: Some(body),
                ..Default::default()
            }],
            ..Default::default()
        });

        let mut g1 = tokenizer_graph();
        g1.output[0].name = "ids".to_string();
        g1.node[0].output[0] = "ids".to_string();

        let merged =
            merge_graphs(&g1, &g2, &[Connection::new("ids", "input_ids")], None).unwrap();
        let sub = merged.node[3].attribute[0].g.as_ref().unwrap();
        assert_eq!(sub.node[0].input, vec!["ids"]);
    }

    #[test]
    fn test_connected_input_initializer_dropped() {
        let mut g2 = encoder_graph();
        g2.initializer.push(TensorProto {
            name: "input_ids".to_string(),
            data_type: DataType::Int64 as i32,
            ..Default::default()
        });

        let merged = merge_graphs(
            &tokenizer_graph(),
            &g2,
            &[Connection::new("input_ids", "input_ids")],
            None,
        )
        .unwrap();
        assert!(merged.initializer.iter().all(|t| t.name != "input_ids"));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut g2 = encoder_graph();
        g2.input[0] = vi("input_ids", DataType::Int32);

        let err = merge_graphs(
            &tokenizer_graph(),
            &g2,
            &[Connection::new("input_ids", "input_ids")],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ComposerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_overlapping_names_rejected() {
        let mut g2 = encoder_graph();
        g2.node[0].output[0] = "extra_debug_tensor".to_string();
        g2.node[1].input[0] = "extra_debug_tensor".to_string();

        let err = merge_graphs(
            &tokenizer_graph(),
            &g2,
            &[Connection::new("input_ids", "input_ids")],
            None,
        )
        .unwrap_err();
        match err {
            ComposerError::OverlappingNames(names) => {
                assert_eq!(names, vec!["extra_debug_tensor".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shared_external_input_allowed() {
        let mut g2 = encoder_graph();
        g2.input.push(vi("text", DataType::String));

        let merged = merge_graphs(
            &tokenizer_graph(),
            &g2,
            &[Connection::new("input_ids", "input_ids")],
            None,
        )
        .unwrap();
        assert_eq!(names(&merged.input), vec!["text", "config_scale"]);
    }

    #[test]
    fn test_prefix_resolves_overlap() {
        let mut g2 = encoder_graph();
        g2.node[0].output[0] = "extra_debug_tensor".to_string();
        g2.node[1].input[0] = "extra_debug_tensor".to_string();

        let pre = ModelProto {
            ir_version: 8,
            graph: Some(tokenizer_graph()),
            ..Default::default()
        };
        let base = ModelProto {
            ir_version: 8,
            graph: Some(g2),
            ..Default::default()
        };

        let options = MergeOptions {
            prefix_preprocessing: Some("tok/".to_string()),
            ..Default::default()
        };
        let merged = merge_models(
            &pre,
            &base,
            &[Connection::new("input_ids", "input_ids")],
            &options,
        )
        .unwrap();
        let graph = merged.graph.unwrap();
        assert_eq!(names(&graph.input), vec!["tok/text", "config_scale"]);
        assert_eq!(graph.node[1].input, vec!["word_embeddings", "tok/input_ids"]);
    }

    #[test]
    fn test_merge_models_requires_equal_ir() {
        let pre = ModelProto {
            ir_version: 8,
            graph: Some(tokenizer_graph()),
            ..Default::default()
        };
        let base = ModelProto {
            ir_version: 7,
            graph: Some(encoder_graph()),
            ..Default::default()
        };

        let err = merge_models(&pre, &base, &[], &MergeOptions::default()).unwrap_err();
        assert!(matches!(err, ComposerError::VersionMismatch { .. }));
    }

    #[test]
    fn test_merge_opsets() {
        let a = vec![OperatorSetIdProto {
            domain: "ai.onnx.contrib".to_string(),
            version: 1,
        }];
        let b = vec![
            OperatorSetIdProto {
                domain: String::new(),
                version: 14,
            },
            OperatorSetIdProto {
                domain: "ai.onnx.contrib".to_string(),
                version: 1,
            },
        ];
        let merged = merge_opsets(&a, &b).unwrap();
        assert_eq!(merged.len(), 2);

        let c = vec![OperatorSetIdProto {
            domain: "ai.onnx".to_string(),
            version: 17,
        }];
        let err = merge_opsets(&b, &c).unwrap_err();
        assert!(matches!(err, ComposerError::OpsetConflict { left: 14, right: 17, .. }));
    }

    #[test]
    fn test_merge_metadata_conflict() {
        let entry = |k: &str, v: &str| StringStringEntryProto {
            key: k.to_string(),
            value: v.to_string(),
        };
        let merged =
            merge_metadata(&[entry("a", "1")], &[entry("a", "1"), entry("b", "2")]).unwrap();
        assert_eq!(merged.len(), 2);

        let err = merge_metadata(&[entry("a", "1")], &[entry("a", "2")]).unwrap_err();
        assert!(matches!(err, ComposerError::MetadataConflict(key) if key == "a"));
    }

    fn ids_tokenizer_graph() -> GraphProto {
        let mut g1 = tokenizer_graph();
        g1.output[0].name = "ids".to_string();
        g1.node[0].output[0] = "ids".to_string();
        g1
    }

    fn annotation(tensor: &str, scale: &str) -> TensorAnnotation {
        TensorAnnotation {
            tensor_name: tensor.to_string(),
            quant_parameter_tensor_names: vec![StringStringEntryProto {
                key: "SCALE_TENSOR".to_string(),
                value: scale.to_string(),
            }],
        }
    }

    fn sparse(values: &str, indices: &str) -> SparseTensorProto {
        SparseTensorProto {
            values: Some(TensorProto {
                name: values.to_string(),
                data_type: DataType::Float as i32,
                ..Default::default()
            }),
            indices: Some(TensorProto {
                name: indices.to_string(),
                data_type: DataType::Int64 as i32,
                ..Default::default()
            }),
            dims: vec![4],
        }
    }

    fn function(name: &str, doc: &str) -> FunctionProto {
        FunctionProto {
            name: name.to_string(),
            domain: "local".to_string(),
            doc_string: doc.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_connected_output_clashing_with_base_tensor_rejected() {
        let g2 = GraphProto {
            name: "enc".to_string(),
            node: vec![
                node("first", "Relu", &["input_ids"], &["ids"]),
                node("second", "Relu", &["ids"], &["out"]),
            ],
            input: vec![vi("input_ids", DataType::Int64)],
            output: vec![vi("out", DataType::Int64)],
            ..Default::default()
        };

        let err = merge_graphs(
            &ids_tokenizer_graph(),
            &g2,
            &[Connection::new("ids", "input_ids")],
            None,
        )
        .unwrap_err();
        match err {
            ComposerError::OverlappingNames(names) => assert_eq!(names, vec!["ids".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_connected_input_annotation_dropped() {
        let mut g1 = ids_tokenizer_graph();
        g1.quantization_annotation.push(annotation("ids", "ids_scale"));
        let mut g2 = encoder_graph();
        g2.quantization_annotation.push(annotation("input_ids", "input_scale"));
        g2.quantization_annotation.push(annotation("h", "h_scale"));

        let merged =
            merge_graphs(&g1, &g2, &[Connection::new("ids", "input_ids")], None).unwrap();
        let annotated: Vec<&str> = merged
            .quantization_annotation
            .iter()
            .map(|a| a.tensor_name.as_str())
            .collect();
        assert_eq!(annotated, vec!["ids", "h"]);
    }

    #[test]
    fn test_connected_input_sparse_initializer_dropped() {
        let mut g2 = encoder_graph();
        g2.sparse_initializer.push(sparse("input_ids", "input_ids_indices"));
        g2.sparse_initializer.push(sparse("sparse_bias", "sparse_bias_indices"));

        let merged = merge_graphs(
            &tokenizer_graph(),
            &g2,
            &[Connection::new("input_ids", "input_ids")],
            None,
        )
        .unwrap();
        assert_eq!(merged.sparse_initializer.len(), 1);
        assert_eq!(
            merged.sparse_initializer[0].values.as_ref().unwrap().name,
            "sparse_bias"
        );
    }

    #[test]
    fn test_add_prefix_reaches_sparse_and_annotations() {
        let mut graph = encoder_graph();
        graph.sparse_initializer.push(sparse("sparse_bias", "sparse_bias_indices"));
        graph.quantization_annotation.push(annotation("h", "h_scale"));

        add_prefix(&mut graph, "enc/");

        let sparse = &graph.sparse_initializer[0];
        assert_eq!(sparse.values.as_ref().unwrap().name, "enc/sparse_bias");
        assert_eq!(sparse.indices.as_ref().unwrap().name, "enc/sparse_bias_indices");
        let annotation = &graph.quantization_annotation[0];
        assert_eq!(annotation.tensor_name, "enc/h");
        assert_eq!(annotation.quant_parameter_tensor_names[0].key, "SCALE_TENSOR");
        assert_eq!(annotation.quant_parameter_tensor_names[0].value, "enc/h_scale");
    }

    #[test]
    fn test_training_info_rejected() {
        let pre = ModelProto {
            ir_version: 8,
            graph: Some(tokenizer_graph()),
            ..Default::default()
        };
        let base = ModelProto {
            ir_version: 8,
            graph: Some(encoder_graph()),
            training_info: vec![TrainingInfoProto::default()],
            ..Default::default()
        };

        let err = merge_models(
            &pre,
            &base,
            &[Connection::new("input_ids", "input_ids")],
            &MergeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ComposerError::InvalidModel(msg) if msg.contains("training_info")));
    }

    #[test]
    fn test_merge_functions_duplicates() {
        let merged = merge_functions(
            &[function("gelu", "")],
            &[function("gelu", ""), function("swish", "")],
        )
        .unwrap();
        let names: Vec<&str> = merged.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["gelu", "swish"]);

        let err = merge_functions(&[function("gelu", "")], &[function("gelu", "tanh approx")])
            .unwrap_err();
        match err {
            ComposerError::OverlappingNames(names) => {
                assert_eq!(names, vec!["function local::gelu".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
